//! Configuration validation.
//!
//! Returns all validation errors, not just the first. Runs before a config is
//! accepted into the system.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A semantic problem with an otherwise well-formed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.address must not be empty")]
    EmptyAddress,

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("listener.max_message_bytes must be greater than zero")]
    ZeroMaxMessageBytes,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check value ranges the deserializer cannot express.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.address.trim().is_empty() {
        errors.push(ValidationError::EmptyAddress);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if config.listener.max_message_bytes == 0 {
        errors.push(ValidationError::ZeroMaxMessageBytes);
    }
    if config.listener.read_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("listener.read_timeout_secs"));
    }
    if config.executor.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("executor.connect_timeout_secs"));
    }
    if config.executor.default_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("executor.default_timeout_secs"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
