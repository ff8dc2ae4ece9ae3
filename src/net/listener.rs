//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Resolve and bind the configured address and port
//! - Set `SO_REUSEADDR` so a restarted server can rebind immediately
//! - Enforce max_connections limit via semaphore

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;

const BACKLOG: u32 = 1024;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Address did not resolve to any socket address.
    Resolve(String),
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Resolve(addr) => write!(f, "Failed to resolve {}", addr),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Accepting socket with a cap on concurrently served connections.
///
/// Once the cap is reached, further clients queue in the kernel backlog.
pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let target = format!("{}:{}", config.address, config.port);
        let mut resolved = tokio::net::lookup_host(&target)
            .await
            .map_err(ListenerError::Bind)?;
        let addr = resolved
            .next()
            .ok_or_else(|| ListenerError::Resolve(target.clone()))?;

        let socket = listen_on(addr, config.reuse_address).map_err(ListenerError::Bind)?;
        let bound = socket.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %bound,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Wait for a free slot, then for the next client.
    ///
    /// The returned permit must live as long as the connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| ListenerError::Accept(std::io::Error::other(e)))?;

        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(
            peer_addr = %peer,
            free_slots = self.slots.available_permits(),
            "Connection accepted"
        );

        Ok((stream, peer, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

fn listen_on(addr: SocketAddr, reuse_address: bool) -> std::io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(reuse_address)?;
    socket.bind(addr)?;
    socket.listen(BACKLOG)
}

/// Held for a connection's lifetime; dropping it frees the slot.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> ListenerConfig {
        ListenerConfig {
            address: "127.0.0.1".into(),
            port,
            max_connections: 2,
            ..ListenerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_and_accept() {
        let listener = Listener::bind(&config(0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.max_connections(), 2);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, peer, permit) = listener.accept().await.unwrap();
        assert!(peer.ip().is_loopback());
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_rebind_after_close() {
        let listener = Listener::bind(&config(0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let again = Listener::bind(&config(port)).await.unwrap();
        assert_eq!(again.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_unresolvable_address() {
        let mut cfg = config(0);
        cfg.address = "no such host".into();
        assert!(Listener::bind(&cfg).await.is_err());
    }
}
