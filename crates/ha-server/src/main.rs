//! Home Assistant Rust Server
//!
//! Main entry point for the Home Assistant Rust implementation.
//!
//! Usage: `homeassistant [CONFIG_DIR]` (defaults to the current directory).

mod hass;

use anyhow::{Context as _, Result};
use ha_config::CoreConfig;
use hass::HomeAssistant;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_tracing(default_directive: &str) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .with_context(|| format!("invalid log_level '{}'", default_directive))?,
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let config = CoreConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {}", config_dir))?;

    init_tracing(&config.log_level)?;

    info!(name = %config.name, config_dir = %config_dir, "Starting Home Assistant (Rust)");

    let hass = HomeAssistant::new(&config)?;
    hass.start();

    info!("Home Assistant is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    hass.stop().await;

    Ok(())
}
