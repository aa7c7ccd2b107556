//! bandstand - storage and delegation gateway for the band site

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bandstand::{config::Args, local::LocalProvider, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("bandstand={},info", args.log_level).into());
    if args.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  bandstand - band site storage gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Data dir: {}", args.data_dir.display());
    info!("Persist registry: {}", args.persist);
    info!("Gateway: {}", args.gateway_base());
    info!("Probe timeout: {} ms", args.probe_timeout_ms);
    info!("Default delegation lifetime: {} h", args.default_expiration_hours);
    info!("======================================");

    let provider = LocalProvider::open(&args).await?;
    let state = Arc::new(AppState::new(args, Arc::new(provider))?);

    server::run(state).await?;

    Ok(())
}
