//! switchyard demo server.
//!
//! ```text
//!     Client ──▶ axum transport ──▶ Dispatcher ──▶ RouteTable lookup
//!                                      │
//!                     ┌────────────────┼─────────────────┐
//!                     ▼                ▼                 ▼
//!                 plain HTTP      WebSocket 101     EventSource 200
//!               (middleware +    (session task +    (stream task +
//!                 sandbox)          codec)            sink)
//! ```

use std::path::PathBuf;

use clap::Parser;

use switchyard::config::{load_config, ServerConfig};
use switchyard::lifecycle::{shutdown_signal, Runner};
use switchyard::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Routing web framework demo server", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    switchyard::demo::configure(&mut config);

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let runner = Runner::new(config, switchyard::demo::routes())?;
    runner.run_until(shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
