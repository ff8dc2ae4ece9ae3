//! Request pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! HttpRequest
//!     → cache.rs (fingerprint lookup; a hit returns here)
//!     → rate_limit.rs (per-domain spacing)
//!     → executor.rs (outbound HTTP, redirects disabled)
//!     → cache.rs (store response)
//!     → HttpResponse
//! ```
//!
//! # Design Decisions
//! - Every stage implements [`Stage`]; composition happens once at startup
//! - Executor errors pass through the cache untouched and are never stored
//! - Closing the pipeline closes the executor at the bottom of the chain

pub mod cache;
pub mod executor;
pub mod rate_limit;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use cache::{CacheStage, CacheStore, HitSink};
pub use executor::HttpExecutor;
pub use rate_limit::RateLimited;
pub use types::{
    CallError, CallOptions, ErrorKind, Fingerprint, HttpRequest, HttpResponse, ProxySettings,
};

use crate::config::GatewayConfig;

/// One step of the request pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn execute(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> Result<HttpResponse, CallError>;

    /// Release resources. Stages that wrap another stage forward the call.
    fn close(&self) {}
}

/// Cache wrapping rate limiting wrapping an executor.
pub struct Pipeline {
    head: Arc<CacheStage>,
}

impl Pipeline {
    /// Compose the pipeline around an arbitrary bottom stage.
    pub fn new(executor: Arc<dyn Stage>, min_interval: Duration, hits: HitSink) -> Self {
        let limited: Arc<dyn Stage> = Arc::new(RateLimited::new(executor, min_interval));
        Self {
            head: Arc::new(CacheStage::new(limited, hits)),
        }
    }

    /// Compose the production pipeline with a real HTTP executor.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, CallError> {
        let executor = Arc::new(HttpExecutor::new(&config.executor)?);
        let hits = if config.observability.hit_diagnostics {
            HitSink::stdout()
        } else {
            HitSink::disabled()
        };
        Ok(Self::new(executor, config.rate_limit.min_interval(), hits))
    }

    pub async fn execute(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> Result<HttpResponse, CallError> {
        self.head.execute(request, options).await
    }

    pub fn cache(&self) -> &CacheStore {
        self.head.store()
    }

    pub fn close(&self) {
        self.head.close();
    }
}
