//! Accept loop tying the listener to the dispatcher.
//!
//! # Responsibilities
//! - Accept connections until shutdown is signalled
//! - Spawn one task per connection, each inside its own span
//! - On shutdown: close the listening socket, then close the executor

use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::connection::{Connection, ConnectionTracker, ExchangeLimits};
use crate::net::listener::Listener;
use crate::rpc::{Dispatcher, ServerContext};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// The gateway server: a bound listener plus the shared dispatcher.
pub struct GatewayServer {
    listener: Listener,
    dispatcher: Dispatcher,
    tracker: ConnectionTracker,
    limits: ExchangeLimits,
}

impl GatewayServer {
    pub fn new(listener: Listener, context: Arc<ServerContext>, limits: ExchangeLimits) -> Self {
        Self {
            listener,
            dispatcher: Dispatcher::new(context),
            tracker: ConnectionTracker::new(),
            limits,
        }
    }

    /// Serve until `shutdown` fires, then release shared resources.
    ///
    /// Connection tasks still running are not awaited; they finish on their own.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let GatewayServer {
            listener,
            dispatcher,
            tracker,
            limits,
        } = self;

        loop {
            let accepted = tokio::select! {
                () = shutdown.recv() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let guard = tracker.track();
            let span = tracing::info_span!(
                "connection",
                connection_id = %guard.id(),
                call_id = %Uuid::new_v4(),
                peer = %peer,
            );
            let dispatcher = dispatcher.clone();
            tokio::spawn(
                async move {
                    let _guard = guard;
                    let _permit = permit;
                    Connection::new(stream, peer, limits).serve(&dispatcher).await;
                }
                .instrument(span),
            );
        }

        drop(listener);
        tracing::info!("Listener closed");

        dispatcher.context().close();
        tracing::info!(
            in_flight = tracker.in_flight(),
            "Shared resources released"
        );
    }
}
