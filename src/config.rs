//! Configuration file model
//!
//! One YAML document with an `agent`, a `browser` and a `planner` section,
//! plus `backend` and the `openai_compat` section for chat-completions
//! servers. Every field has a default, so partial files are fine.

use std::env;

use agent_core::{AgentConfig, AnthropicConfig, OpenAiCompatConfig};
use anyhow::{Context, Result};
use clap::ValueEnum;
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};

pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_MODEL: &str = "PILOT_MODEL";
pub const ENV_MAX_STEPS: &str = "PILOT_MAX_STEPS";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Which planner service `pilot run` talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PlannerBackend {
    /// Anthropic Messages API with the computer-use tools (`planner` section).
    #[default]
    Anthropic,
    /// OpenAI-compatible chat completions, e.g. vLLM (`openai_compat` section).
    OpenaiCompat,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub agent: AgentConfig,
    pub browser: CdpConfig,
    pub backend: PlannerBackend,
    pub planner: AnthropicConfig,
    pub openai_compat: OpenAiCompatConfig,
}

impl PilotConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration")
    }

    /// Applies `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `PILOT_MODEL` and
    /// `PILOT_MAX_STEPS` from the process environment. `PILOT_MODEL` targets
    /// the selected backend.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup(ENV_API_KEY) {
            self.planner.api_key = key.trim().to_string();
        }
        if let Some(key) = lookup(ENV_OPENAI_API_KEY) {
            self.openai_compat.api_key = key.trim().to_string();
        }
        if let Some(model) = lookup(ENV_MODEL) {
            let model = model.trim().to_string();
            match self.backend {
                PlannerBackend::Anthropic => self.planner.model = model,
                PlannerBackend::OpenaiCompat => self.openai_compat.model = model,
            }
        }
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.agent.max_steps = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_STEPS} must be a non-negative integer, got {raw:?}"))?;
        }
        Ok(())
    }
}
