//! Shared, rate-limited, caching HTTP gateway.
//!
//! Client processes send outbound HTTP request descriptors to one gateway
//! server over TCP. The server executes them, caches responses and spaces
//! calls per destination domain so the combined traffic of every client
//! respects the remote service's rate limits.

pub mod client;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod rpc;
pub mod server;

pub use client::{ClientError, GatewayClient};
pub use config::GatewayConfig;
pub use lifecycle::{ServerHandle, Shutdown};
pub use pipeline::{HttpRequest, HttpResponse, Pipeline, ProxySettings};
pub use rpc::{Dispatcher, ServerContext};
