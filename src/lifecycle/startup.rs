//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared server context (cache, rate limiter, executor)
//! - Bind the listener and start the accept task
//! - Either hand the running server to the embedding caller, or block until
//!   interrupted and run the full shutdown sequence
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener starts last (traffic only when ready)

use std::future::Future;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

use crate::config::GatewayConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::net::connection::ExchangeLimits;
use crate::net::listener::{Listener, ListenerError};
use crate::pipeline::CallError;
use crate::rpc::ServerContext;
use crate::server::GatewayServer;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0}")]
    Listener(#[from] ListenerError),

    #[error("failed to initialize HTTP executor: {0}")]
    Executor(#[from] CallError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] JoinError),
}

/// A running server owned by the embedding caller.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<()>,
    context: Arc<ServerContext>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Stop accepting, close the listening socket and the executor, then
    /// wait for the accept task to finish.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.shutdown.trigger();
        self.task.await
    }
}

/// Start a server with a production pipeline built from `config`.
pub async fn spawn(config: &GatewayConfig) -> Result<ServerHandle, StartupError> {
    let context = Arc::new(ServerContext::from_config(config)?);
    spawn_with_context(config, context).await
}

/// Start a server around an already-built context.
pub async fn spawn_with_context(
    config: &GatewayConfig,
    context: Arc<ServerContext>,
) -> Result<ServerHandle, StartupError> {
    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr()?;

    let shutdown = Shutdown::new();
    let limits = ExchangeLimits::from_config(&config.listener);
    let server = GatewayServer::new(listener, Arc::clone(&context), limits);
    let task = tokio::spawn(server.run(shutdown.subscribe()));

    tracing::info!(address = %local_addr, "Gateway started");
    Ok(ServerHandle {
        local_addr,
        shutdown,
        task,
        context,
    })
}

/// Run in the foreground until `stop` resolves, writing status lines to `out`.
pub async fn run_until<F>(
    config: &GatewayConfig,
    stop: F,
    out: &mut dyn Write,
) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    let handle = spawn(config).await?;
    writeln!(
        out,
        "Listening on {} port {}",
        config.listener.address,
        handle.local_addr().port()
    )?;
    writeln!(out, "CTRL-C to shutdown server.")?;
    out.flush()?;

    stop.await;

    handle.shutdown().await?;
    writeln!(out, "Goodbye!")?;
    out.flush()?;
    Ok(())
}

/// Run in the foreground until Ctrl-C.
pub async fn run_foreground(config: &GatewayConfig) -> Result<(), StartupError> {
    let mut stdout = io::stdout();
    run_until(
        config,
        async {
            if let Err(e) = signals::interrupted().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
            }
        },
        &mut stdout,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn config() -> GatewayConfig {
        GatewayConfig {
            listener: ListenerConfig {
                address: "127.0.0.1".into(),
                port: 0,
                ..ListenerConfig::default()
            },
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let handle = spawn(&config()).await.unwrap();
        let addr = handle.local_addr();
        assert!(TcpStream::connect(addr).await.is_ok());

        let context = Arc::clone(handle.context());
        handle.shutdown().await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
        let err = context
            .pipeline()
            .execute(
                &crate::pipeline::HttpRequest::get("http://127.0.0.1:9/"),
                &crate::pipeline::CallOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, CallError::ExecutorClosed);
    }

    #[tokio::test]
    async fn test_foreground_prints_lifecycle_lines() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut out = Vec::new();
        let config = config();

        let run = run_until(
            &config,
            async {
                let _ = rx.await;
            },
            &mut out,
        );
        tx.send(()).unwrap();
        run.await.unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("Listening on 127.0.0.1 port "));
        assert!(printed.contains("CTRL-C to shutdown server.\n"));
        assert!(printed.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = spawn(&config()).await.unwrap();
        let mut taken = config();
        taken.listener.port = first.local_addr().port();
        taken.listener.reuse_address = false;

        let err = spawn(&taken).await.err().unwrap();
        assert!(matches!(err, StartupError::Listener(ListenerError::Bind(_))));
        first.shutdown().await.unwrap();
    }
}
