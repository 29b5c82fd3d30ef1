//! Chromium DevTools Protocol control surface.
//!
//! The agent drives the browser exclusively through [`ControlSurface`]. This crate
//! ships the CDP-backed implementation together with the key-token parser used
//! for keyboard input.

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
    pub enum AdapterErrorKind {
        #[error("command timed out")]
        Timeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("target not found")]
        TargetNotFound,
        #[error("script evaluation failed")]
        Script,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to the agent.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }
    }
}

pub mod config {
    use serde::{Deserialize, Serialize};
    use std::{env, path::PathBuf};

    /// Configuration for launching or attaching to Chromium.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        /// Chrome binary. Empty means "let chromiumoxide find one".
        pub executable: PathBuf,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        /// Required when Chrome runs as root, e.g. inside a container.
        pub no_sandbox: bool,
        /// Per-command response deadline.
        pub default_deadline_ms: u64,
        /// Attach to an already running browser instead of launching one.
        pub websocket_url: Option<String>,
        /// Window size at launch. The agent's viewport follows it.
        pub window_width: u32,
        pub window_height: u32,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: crate::locate::chrome_executable().unwrap_or_default(),
                user_data_dir: env::var_os("PILOT_CHROME_PROFILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./.pilot-profile")),
                headless: env_flag("PILOT_HEADLESS").unwrap_or(true),
                no_sandbox: env_flag("PILOT_NO_SANDBOX").unwrap_or(false),
                default_deadline_ms: 30_000,
                websocket_url: None,
                window_width: 1280,
                window_height: 800,
            }
        }
    }

    /// Unrecognised values count as unset.
    fn env_flag(name: &str) -> Option<bool> {
        let raw = env::var(name).ok()?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

}

pub mod keys;
pub mod locate;
pub mod metrics;
pub mod surface;
pub mod transport;

pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use keys::{Key, KeyChord, Modifier, NamedKey};
pub use metrics::AdapterMetricsSnapshot;
pub use surface::{CdpControlSurface, ClickKind, ControlSurface};
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget};
