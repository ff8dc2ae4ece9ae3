//! Operation lookup and invocation.
//!
//! # Responsibilities
//! - Resolve an envelope's operation name through a fixed handler table
//! - Decode the operation's typed arguments
//! - Run it against the shared [`ServerContext`]
//! - Turn every outcome, including failures, into one [`CallResult`]

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::pipeline::types::{CallError, CallOptions, HttpRequest, ProxySettings};
use crate::pipeline::Pipeline;
use crate::rpc::envelope::{CallEnvelope, CallResult};

/// Operations a client may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Execute an HTTP request through the cache and rate limiter.
    Request,
    /// Remove cached responses for one or more URLs.
    Evict,
    /// Drop the whole cache.
    ClearCache,
}

/// Wire names. `clear` is accepted as a short alias.
const HANDLERS: &[(&str, Operation)] = &[
    ("request", Operation::Request),
    ("evict", Operation::Evict),
    ("clear_cache", Operation::ClearCache),
    ("clear", Operation::ClearCache),
];

impl Operation {
    pub fn resolve(name: &str) -> Option<Self> {
        HANDLERS
            .iter()
            .find(|(wire_name, _)| *wire_name == name)
            .map(|(_, op)| *op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Request => "request",
            Operation::Evict => "evict",
            Operation::ClearCache => "clear_cache",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RequestArgs {
    request: HttpRequest,
    #[serde(default)]
    proxies: ProxySettings,
    /// Seconds.
    #[serde(default)]
    timeout: Option<f64>,
}

impl RequestArgs {
    fn options(&self) -> Result<CallOptions, CallError> {
        let timeout = self
            .timeout
            .map(Duration::try_from_secs_f64)
            .transpose()
            .map_err(|e| CallError::InvalidArguments {
                operation: Operation::Request.name().to_string(),
                message: format!("invalid timeout: {e}"),
            })?;
        Ok(CallOptions {
            proxies: self.proxies.clone(),
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EvictArgs {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
}

impl EvictArgs {
    fn into_urls(self) -> Vec<String> {
        let mut urls = self.urls;
        urls.extend(self.url);
        urls
    }
}

/// Server-wide shared state, created once at startup.
pub struct ServerContext {
    pipeline: Pipeline,
}

impl ServerContext {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, CallError> {
        Ok(Self::new(Pipeline::from_config(config)?))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Close the executor; in-flight and later requests fail.
    pub fn close(&self) {
        self.pipeline.close();
    }
}

/// Routes decoded envelopes to their handlers.
#[derive(Clone)]
pub struct Dispatcher {
    context: Arc<ServerContext>,
}

impl Dispatcher {
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Run one call. Never fails: errors become [`CallResult::Error`].
    pub async fn dispatch(&self, envelope: CallEnvelope) -> CallResult {
        let operation = Operation::resolve(&envelope.operation);
        let result = match operation {
            Some(op) => self.invoke(op, &envelope).await,
            None => Err(CallError::UnknownOperation(envelope.operation.clone())),
        };

        let label = operation.map_or("unknown", |op| op.name());
        match &result {
            Ok(_) => metrics::record_call(label, "ok"),
            Err(e) => {
                tracing::debug!(operation = %envelope.operation, error = %e, "Call failed");
                metrics::record_call(label, "error");
            }
        }
        CallResult::from(result)
    }

    async fn invoke(&self, op: Operation, envelope: &CallEnvelope) -> Result<Value, CallError> {
        match op {
            Operation::Request => {
                let args: RequestArgs = envelope.decode_arguments()?;
                let options = args.options()?;
                let response = self.context.pipeline.execute(&args.request, &options).await?;
                serde_json::to_value(response).map_err(|e| CallError::Internal(e.to_string()))
            }
            Operation::Evict => {
                let args: EvictArgs = envelope.decode_arguments()?;
                let urls = args.into_urls();
                let removed = self.context.pipeline.cache().evict(&urls);
                tracing::info!(urls = ?urls, removed, "Evicted cache entries");
                Ok(Value::from(removed))
            }
            Operation::ClearCache => {
                self.context.pipeline.cache().clear();
                tracing::info!("Cache cleared");
                Ok(Value::Null)
            }
        }
    }
}
