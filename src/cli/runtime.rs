use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::env::LogFormat;
use crate::config::PilotConfig;

pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
    .context("Failed to initialize logging")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: PilotConfig,
    /// File the configuration came from, if any.
    pub path: Option<PathBuf>,
}

/// Loads the first configuration file that exists, then applies environment
/// overrides. An explicit `--config` path must exist.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let found = match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        }
        None => candidate_paths().into_iter().find(|path| path.exists()),
    };

    let mut config = match &found {
        Some(path) => {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = PilotConfig::from_yaml(&content)?;
            info!("Loaded configuration from: {}", path.display());
            config
        }
        None => {
            warn!("No config file found, using defaults");
            PilotConfig::default()
        }
    };
    config.apply_env_overrides()?;

    Ok(LoadedConfig {
        config,
        path: found,
    })
}

/// Lookup order when no `--config` is given: `./config/pilot.yaml`, then
/// `<config dir>/pilot/config.yaml`.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config/pilot.yaml")];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("pilot");
        dir.push("config.yaml");
        paths.push(dir);
    }
    paths
}
