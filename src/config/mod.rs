//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → command-line flags override individual fields
//!     → consumed once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts
//! - All fields have defaults so the server runs with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ExecutorConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig};
