//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (one exchange, failure classification)
//!     → Hand off to the RPC dispatcher
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked so shutdown can report stragglers
//! - A bad connection never affects the listener or other connections

pub mod connection;
pub mod listener;
