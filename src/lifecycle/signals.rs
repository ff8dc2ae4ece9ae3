//! OS signal handling.
//!
//! Ctrl-C (SIGINT) is the only signal the foreground server reacts to; it
//! triggers the ordered shutdown sequence.

use std::io;

/// Wait for Ctrl-C.
pub async fn interrupted() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    Ok(())
}
