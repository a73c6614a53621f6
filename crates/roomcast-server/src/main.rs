//! # roomcast
//!
//! Room-based realtime message relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! roomcast
//!
//! # Run with a config file
//! roomcast --config /path/to/roomcast.toml
//! ROOMCAST_CONFIG=/path/to/roomcast.toml roomcast
//!
//! # Override single settings from the environment
//! ROOMCAST_PORT=9000 ROOMCAST_ROOMS__INBOUND_CAPACITY=64 roomcast
//! ```

mod config;
mod console;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast=info,roomcast_core=info,roomcast_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let args: Vec<String> = std::env::args().collect();
    let config = match args.iter().position(|arg| arg == "--config") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
            config::Config::from_file(path)?
        }
        None => config::Config::load()?,
    };

    tracing::info!("Starting roomcast on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
