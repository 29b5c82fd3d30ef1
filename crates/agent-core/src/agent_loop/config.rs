//! Configuration for the agent loop.

use serde::{Deserialize, Deserializer, Serialize};

use crate::scaling::PlannerCanvas;

/// Every option the agent loop recognizes, with its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Supporting data handed to the planner next to the goal. A structured
    /// value in YAML is stored as its JSON text.
    /// Default: "None"
    #[serde(deserialize_with = "context_text")]
    pub context: String,

    /// Extra instructions appended to the planner's system prompt.
    /// Default: empty
    pub instructions: Vec<String>,

    /// Pause after each executed action in milliseconds.
    /// Default: 500
    pub step_delay_ms: u64,

    /// Wait for a line on stdin after each executed action.
    /// Default: false
    pub pause_after_each_action: bool,

    /// Step budget; the loop stops once this many actions have executed.
    /// Default: 50
    pub max_steps: usize,

    /// Number of most recent steps whose screenshots are replayed to the planner.
    /// Default: 1
    pub screenshot_retention: usize,

    /// Chebyshev distance under which a `mouse_move` is treated as a click.
    /// Default: 5
    pub jitter_tolerance_px: u32,

    /// Resolution budget for planner screenshots.
    /// Default: 1280x800
    pub canvas: PlannerCanvas,

    /// Time given to the pointer listener before it is read.
    /// Default: 100
    pub mouse_probe_settle_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            context: "None".to_string(),
            instructions: Vec::new(),
            step_delay_ms: 500,
            pause_after_each_action: false,
            max_steps: 50,
            screenshot_retention: 1,
            jitter_tolerance_px: 5,
            canvas: PlannerCanvas::default(),
            mouse_probe_settle_ms: 100,
        }
    }
}

impl AgentConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config without pacing, for tests and dry runs.
    pub fn minimal() -> Self {
        Self {
            step_delay_ms: 0,
            max_steps: 10,
            mouse_probe_settle_ms: 0,
            ..Self::default()
        }
    }

    /// Builder: set max steps.
    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Builder: set the planner context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Builder: add one system prompt instruction.
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Builder: set the delay after each action.
    pub fn step_delay(mut self, ms: u64) -> Self {
        self.step_delay_ms = ms;
        self
    }

    /// Builder: toggle the interactive pause.
    pub fn pause(mut self, enabled: bool) -> Self {
        self.pause_after_each_action = enabled;
        self
    }

    /// Builder: set the screenshot retention window.
    pub fn retention(mut self, steps: usize) -> Self {
        self.screenshot_retention = steps;
        self
    }

    /// Builder: set the jitter tolerance.
    pub fn jitter_tolerance(mut self, px: u32) -> Self {
        self.jitter_tolerance_px = px;
        self
    }

    /// Builder: set the planner canvas.
    pub fn canvas(mut self, canvas: PlannerCanvas) -> Self {
        self.canvas = canvas;
        self
    }
}

fn context_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => "None".to_string(),
        other => other.to_string(),
    })
}
