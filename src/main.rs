//! Request gateway server.
//!
//! # Architecture Overview
//!
//! ```text
//!   client process ──┐
//!   client process ──┼─▶ listener ─▶ connection task ─▶ dispatcher
//!   client process ──┘                                     │
//!                                                          ▼
//!                                 ┌─────────┐   ┌────────────┐   ┌──────────┐
//!                                 │  cache  │──▶│ rate limit │──▶│ executor │──▶ remote API
//!                                 └─────────┘   └────────────┘   └──────────┘
//! ```
//!
//! Command-line flags take priority over the config file.

use clap::Parser;
use std::path::PathBuf;

use request_gateway::config::validation::validate_config;
use request_gateway::config::{load_config, ConfigError, GatewayConfig};
use request_gateway::lifecycle::run_foreground;
use request_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "request-gateway", version)]
#[command(about = "Shared cached, rate-limited HTTP gateway", long_about = None)]
struct Cli {
    /// The address or host to listen on. Use 0.0.0.0 to listen on all addresses.
    #[arg(short = 'a', long = "addr")]
    addr: Option<String>,

    /// The port to listen for requests on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum spacing between calls to the same domain, in milliseconds.
    #[arg(long)]
    min_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(addr) = cli.addr {
        config.listener.address = addr;
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(interval) = cli.min_interval_ms {
        config.rate_limit.min_interval_ms = interval;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(
        address = %config.listener.address,
        port = config.listener.port,
        min_interval_ms = config.rate_limit.min_interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    run_foreground(&config).await?;
    Ok(())
}
