//! pilot CLI library
//!
//! Exposes configuration loading and the command implementations for
//! integration testing.

pub mod cli;
pub mod config;

pub use config::PilotConfig;
