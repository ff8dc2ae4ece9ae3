//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rpc::codec::DEFAULT_MAX_MESSAGE_BYTES;

/// Root configuration for the request gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (address, port, connection limits).
    pub listener: ListenerConfig,

    /// Per-domain call spacing.
    pub rate_limit: RateLimitConfig,

    /// Outbound HTTP client settings.
    pub executor: ExecutorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address or host to listen on. `0.0.0.0` listens on all interfaces.
    pub address: String,

    /// Port to listen on. Port 0 picks an ephemeral port.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Set `SO_REUSEADDR` on the listening socket.
    pub reuse_address: bool,

    /// Seconds a client has to deliver its whole call envelope.
    pub read_timeout_secs: u64,

    /// Largest accepted inbound message, in bytes.
    pub max_message_bytes: usize,
}

impl ListenerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 10101,
            max_connections: 1024,
            reuse_address: true,
            read_timeout_secs: 30,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum spacing between two calls to the same domain, in milliseconds.
    pub min_interval_ms: u64,
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2000,
        }
    }
}

/// Outbound HTTP executor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total request timeout used when a call does not carry its own.
    pub default_timeout_secs: u64,

    /// How long idle pooled connections are kept alive.
    pub pool_idle_timeout_secs: u64,

    /// User-Agent header sent when the request descriptor has none.
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            default_timeout_secs: 45,
            pool_idle_timeout_secs: 90,
            user_agent: concat!("request-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Print `HIT <METHOD> <URL>` lines to stdout on cache hits.
    pub hit_diagnostics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9101".to_string(),
            hit_diagnostics: true,
        }
    }
}
