//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build context → Bind listener → Spawn accept task
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Close listener → Close executor
//!
//! Signals (signals.rs):
//!     SIGINT → Trigger shutdown (foreground mode only)
//! ```
//!
//! # Design Decisions
//! - Embedding callers get a `ServerHandle` and own shutdown
//! - Connection tasks are never aborted; closing the executor fails
//!   any call still waiting on the network

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{run_foreground, spawn, spawn_with_context, ServerHandle, StartupError};
