//! Per-connection handling and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Run the single request/response exchange of a connection
//! - Classify connection failures (benign, corrupt, unhandled)
//! - Track the number of connections still in flight

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::config::ListenerConfig;
use crate::observability::metrics;
use crate::rpc::codec::{self, CodecError, ErrorClass};
use crate::rpc::{CallEnvelope, Dispatcher};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, shown in the connection span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts connections whose worker task has not finished yet.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    in_flight: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; it stays counted until the guard drops.
    pub fn track(&self) -> ConnectionGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_connections(now);
        ConnectionGuard {
            in_flight: Arc::clone(&self.in_flight),
            id: ConnectionId::next(),
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    in_flight: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let left = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_connections(left);
        tracing::trace!(connection_id = %self.id, "Connection finished");
    }
}

/// Bounds on what a client may send before its call is dropped.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeLimits {
    pub read_timeout: Duration,
    pub max_message_bytes: usize,
}

impl ExchangeLimits {
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            max_message_bytes: config.max_message_bytes,
        }
    }
}

impl Default for ExchangeLimits {
    fn default() -> Self {
        Self::from_config(&ListenerConfig::default())
    }
}

/// One accepted client connection carrying exactly one call.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    limits: ExchangeLimits,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, limits: ExchangeLimits) -> Self {
        Self {
            stream,
            peer,
            limits,
        }
    }

    /// Decode one envelope, dispatch it, write the result, close.
    ///
    /// Failures are logged according to their class and never escape.
    pub async fn serve(mut self, dispatcher: &Dispatcher) {
        let peer = self.peer;
        let Err(e) = self.exchange(dispatcher).await else {
            return;
        };

        match e.class() {
            ErrorClass::Benign if matches!(e, CodecError::TimedOut(_)) => {
                tracing::debug!(peer = %peer, error = %e, "Dropping idle connection");
            }
            ErrorClass::Benign => {
                tracing::trace!(peer = %peer, error = %e, "Peer went away");
            }
            ErrorClass::Corrupt => {
                metrics::record_invalid_connection();
                tracing::warn!(peer = %peer, error = %e, "Invalid connection from {}", peer.ip());
            }
            ErrorClass::Unhandled => {
                tracing::error!(peer = %peer, error = %e, "Unhandled connection failure");
            }
        }
    }

    async fn exchange(&mut self, dispatcher: &Dispatcher) -> Result<(), CodecError> {
        let ExchangeLimits {
            read_timeout,
            max_message_bytes,
        } = self.limits;
        let (mut reader, mut writer) = self.stream.split();

        let read = codec::read_message::<CallEnvelope, _>(&mut reader, max_message_bytes);
        let envelope = tokio::time::timeout(read_timeout, read)
            .await
            .map_err(|_| CodecError::TimedOut(read_timeout))??;
        tracing::debug!(operation = %envelope.operation, "Call received");

        let result = dispatcher.dispatch(envelope).await;
        codec::write_message(&mut writer, &result).await
    }
}
