mod auth;
mod camera;
mod commands;
mod config;
mod platform;
mod runtime;
mod scheduler;
mod storage;
mod updates;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::runtime::Controller;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,domoroom=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Database: {}", config.storage.database_path.display());
    info!("  Console: {}", if config.console.enabled { "on" } else { "off" });
    info!("  Snapshot: {}", config.camera.snapshot_path.display());

    info!("Controller is starting...");
    let controller = Controller::start(&config).await?;
    info!("Running as @{}", controller.bot_name());

    controller.run_until_shutdown().await;
    controller.shutdown().await?;

    // The blocking stdin reader would otherwise hold the runtime open
    std::process::exit(0);
}
