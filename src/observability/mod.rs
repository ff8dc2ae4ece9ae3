//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via the fmt subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Each connection runs inside a span carrying its call ID and peer address
//! - `HIT` diagnostics go to stdout directly, not through tracing
//! - Metrics are recorded unconditionally; without an exporter they are dropped

pub mod logging;
pub mod metrics;
