//! Roomwatch CLI
//!
//! Command-line interface for the building sensor analytics service.

use std::path::PathBuf;

use clap::Parser;
use roomwatch::{load_config, Config, RoomwatchBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "roomwatch")]
#[command(about = "Building sensor analytics service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, port={:?}, log_level={:?}",
        args.config,
        args.port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Starting roomwatch service");
    tracing::debug!(
        "Store: {}, query timeout: {:?}, trailing window: {:?}",
        config.store.type_name(),
        config.query.timeout,
        config.query.trailing_window
    );

    RoomwatchBuilder::new(config).build().await?.start().await?;

    Ok(())
}
