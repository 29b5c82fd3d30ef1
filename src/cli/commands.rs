use clap::Subcommand;

use super::config::ConfigArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Pursue a goal in the browser
    Run(RunArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),
}
