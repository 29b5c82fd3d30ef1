use anyhow::Result;
use clap::{Args, Subcommand};

use super::runtime::{candidate_paths, LoadedConfig};

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as YAML (default)
    Show,

    /// Print which file the configuration was loaded from
    Path,
}

pub async fn cmd_config(args: ConfigArgs, loaded: &LoadedConfig) -> Result<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            match &loaded.path {
                Some(path) => println!("# Effective configuration ({})", path.display()),
                None => println!("# Effective configuration (defaults)"),
            }
            print!("{}", loaded.config.to_yaml()?);
        }
        ConfigAction::Path => match &loaded.path {
            Some(path) => println!("{}", path.display()),
            None => {
                println!("No config file found. Searched:");
                for path in candidate_paths() {
                    println!("  {}", path.display());
                }
            }
        },
    }
    Ok(())
}
