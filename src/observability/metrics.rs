//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_calls_total` (counter): calls by operation and outcome
//! - `gateway_cache_hits_total` / `gateway_cache_misses_total` (counters)
//! - `gateway_cache_entries` (gauge): current cache size
//! - `gateway_rate_limit_wait_seconds` (histogram): time spent spacing calls
//! - `gateway_upstream_requests_total` (counter): upstream responses by status
//! - `gateway_upstream_duration_seconds` (histogram): upstream latency
//! - `gateway_upstream_errors_total` (counter): upstream failures by kind
//! - `gateway_active_connections` (gauge)
//! - `gateway_invalid_connections_total` (counter): undecodable envelopes
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus exporter listening on `addr`.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(operation: &'static str, outcome: &'static str) {
    counter!("gateway_calls_total", "operation" => operation, "outcome" => outcome).increment(1);
}

pub fn record_cache_hit() {
    counter!("gateway_cache_hits_total").increment(1);
}

pub fn record_cache_miss() {
    counter!("gateway_cache_misses_total").increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("gateway_cache_entries").set(entries as f64);
}

pub fn record_rate_limit_wait(wait: Duration) {
    histogram!("gateway_rate_limit_wait_seconds").record(wait.as_secs_f64());
}

pub fn record_upstream(status: u16, start: Instant) {
    counter!("gateway_upstream_requests_total", "status" => status.to_string()).increment(1);
    histogram!("gateway_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("gateway_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn set_active_connections(count: u64) {
    gauge!("gateway_active_connections").set(count as f64);
}

pub fn record_invalid_connection() {
    counter!("gateway_invalid_connections_total").increment(1);
}
