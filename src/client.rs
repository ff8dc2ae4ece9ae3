//! Client side of the gateway protocol.
//!
//! Each call opens a fresh connection, sends one envelope and reads one
//! result. A remote failure comes back as [`ClientError::Remote`] carrying
//! the server's error descriptor, so callers can re-raise it locally.

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::pipeline::types::{HttpRequest, HttpResponse, ProxySettings};
use crate::rpc::codec::{self, CodecError};
use crate::rpc::envelope::{CallEnvelope, CallResult, ErrorDescriptor};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to reach gateway: {0}")]
    Connect(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("unexpected payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("remote error: {0}")]
    Remote(ErrorDescriptor),
}

/// Handle to a gateway server at a fixed address.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    address: String,
    max_message_bytes: usize,
}

impl GatewayClient {
    /// `address` is anything `TcpStream::connect` accepts, e.g. `localhost:10101`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            max_message_bytes: codec::DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Refuse results larger than `bytes`.
    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Invoke `operation` with named `arguments` and return its value.
    pub async fn call(&self, operation: &str, arguments: impl Serialize) -> Result<Value, ClientError> {
        let envelope = CallEnvelope::new(operation, arguments)?;
        let mut stream = TcpStream::connect(&self.address).await?;

        codec::write_message(&mut stream, &envelope).await?;
        let result: CallResult = codec::read_message(&mut stream, self.max_message_bytes).await?;
        result.into_result().map_err(ClientError::Remote)
    }

    /// Execute `request` through the gateway's cache and rate limiter.
    pub async fn request(
        &self,
        request: &HttpRequest,
        proxies: &ProxySettings,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, ClientError> {
        let value = self
            .call(
                "request",
                json!({
                    "request": request,
                    "proxies": proxies,
                    "timeout": timeout.map(|t| t.as_secs_f64()),
                }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Evict cached responses for `urls`. Returns how many entries were removed.
    pub async fn evict<S: AsRef<str>>(&self, urls: &[S]) -> Result<u64, ClientError> {
        let urls: Vec<&str> = urls.iter().map(AsRef::as_ref).collect();
        let value = self.call("evict", json!({ "urls": urls })).await?;
        Ok(value.as_u64().unwrap_or_default())
    }

    pub async fn clear_cache(&self) -> Result<(), ClientError> {
        self.call("clear_cache", ()).await.map(|_| ())
    }
}
