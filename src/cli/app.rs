use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::commands::Commands;
use super::config::cmd_config;
use super::env::CliArgs;
use super::run::cmd_run;
use super::runtime::{init_logging, load_config};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_format)?;
    info!(
        "Starting pilot v{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("PILOT_GIT_HASH"),
        env!("PILOT_BUILD_DATE")
    );

    let loaded = load_config(cli.config.as_ref()).await?;

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args, loaded.config).await,
        Commands::Config(args) => cmd_config(args, &loaded).await,
    };

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
