pub mod app;
pub mod commands;
pub mod config;
pub mod env;
pub mod run;
pub mod runtime;

pub use config::{cmd_config, ConfigArgs};
pub use run::{cmd_run, RunArgs};
