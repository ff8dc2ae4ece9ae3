//! RPC subsystem.
//!
//! # Data Flow
//! ```text
//! socket bytes
//!     → codec.rs (one self-delimiting JSON value)
//!     → envelope.rs (CallEnvelope { operation, ...arguments })
//!     → dispatcher.rs (handler table → pipeline or cache admin)
//!     → envelope.rs (CallResult: ok value XOR error descriptor)
//!     → codec.rs (write, shut down write side)
//! ```
//!
//! # Design Decisions
//! - One call per connection; no multiplexing
//! - Errors are values: a failed call still produces exactly one result
//! - Unknown operation names produce a distinct error kind

pub mod codec;
pub mod dispatcher;
pub mod envelope;

pub use codec::{CodecError, ErrorClass};
pub use dispatcher::{Dispatcher, Operation, ServerContext};
pub use envelope::{CallEnvelope, CallResult, ErrorDescriptor};
