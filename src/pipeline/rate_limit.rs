//! Per-domain call spacing.
//!
//! Each destination host gets its own async mutex holding the time of the
//! last call. The domain table is only touched to get or create that entry;
//! the wait and the call itself happen under the domain mutex alone, so
//! different domains never wait on each other.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::observability::metrics;
use crate::pipeline::types::{CallError, CallOptions, HttpRequest, HttpResponse};
use crate::pipeline::Stage;

/// Time of the previous call to one domain, `None` before the first call.
type DomainSlot = Arc<Mutex<Option<Instant>>>;

/// Pipeline stage enforcing a minimum interval between calls to one domain.
pub struct RateLimited {
    inner: Arc<dyn Stage>,
    min_interval: Duration,
    domains: DashMap<String, DomainSlot>,
}

impl RateLimited {
    pub fn new(inner: Arc<dyn Stage>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            domains: DashMap::new(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Number of domains seen so far.
    pub fn tracked_domains(&self) -> usize {
        self.domains.len()
    }

    fn slot(&self, domain: String) -> DomainSlot {
        // The map shard lock is released when the entry guard drops here.
        self.domains
            .entry(domain)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .value()
            .clone()
    }
}

/// The network host of `url`, lowercased.
pub fn domain_of(url: &str) -> Result<String, CallError> {
    let parsed = Url::parse(url).map_err(|e| CallError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| CallError::InvalidUrl {
            url: url.to_string(),
            message: "url has no host".to_string(),
        })
}

#[async_trait]
impl Stage for RateLimited {
    async fn execute(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> Result<HttpResponse, CallError> {
        let domain = domain_of(&request.url)?;
        let slot = self.slot(domain.clone());

        let mut last_call = slot.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(domain = %domain, wait_ms = wait.as_millis() as u64, "Rate limiting");
                metrics::record_rate_limit_wait(wait);
                tokio::time::sleep(wait).await;
            }
        }

        let result = self.inner.execute(request, options).await;
        *last_call = Some(Instant::now());
        drop(last_call);

        result
    }

    fn close(&self) {
        self.inner.close();
    }
}
