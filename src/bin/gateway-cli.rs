use clap::{Parser, Subcommand};
use serde_json::json;

use request_gateway::client::GatewayClient;
use request_gateway::pipeline::{HttpRequest, ProxySettings};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the request gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "localhost:10101")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL through the gateway
    Get {
        url: String,
        /// Send this body, making the request body-bearing (POST)
        #[arg(long)]
        data: Option<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Evict cached responses for one or more URLs
    Evict {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Clear the whole cache
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = GatewayClient::new(cli.addr);

    match cli.command {
        Commands::Get { url, data, timeout } => {
            let request = match data {
                Some(body) => HttpRequest::post(url, body),
                None => HttpRequest::get(url),
            };
            let timeout = timeout.map(std::time::Duration::try_from_secs_f64).transpose()?;
            let response = client.request(&request, &ProxySettings::new(), timeout).await?;
            let printed = json!({
                "status": response.status,
                "url": response.url,
                "headers": response.headers,
                "body": response.text(),
            });
            println!("{}", serde_json::to_string_pretty(&printed)?);
        }
        Commands::Evict { urls } => {
            let removed = client.evict(&urls).await?;
            println!("{}", json!({ "removed": removed }));
        }
        Commands::Clear => {
            client.clear_cache().await?;
            println!("{}", json!({ "cleared": true }));
        }
    }

    Ok(())
}
