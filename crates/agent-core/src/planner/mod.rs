//! Planner capability and its tool-calling implementation.
//!
//! The agent loop only knows [`ActionPlanner`]. [`ToolCallingPlanner`] is the
//! implementation for vision services that speak the computer-use tool
//! protocol: it serializes history with [`HistorySerializer`], sends it through
//! a [`ToolTransport`] and turns the reply into an [`Action`] with
//! [`ActionNormalizer`]. Transports exist for the Anthropic Messages API,
//! OpenAI-compatible chat completions, and scripted offline replies.

pub mod anthropic;
pub mod conversation;
pub mod normalizer;
pub mod openai_compat;
pub mod prompt;
pub mod scripted;
pub mod tool_calling;

use async_trait::async_trait;
use pilot_core_types::{Action, BrowserState, Step};

use crate::errors::AgentError;

pub use anthropic::{AnthropicConfig, AnthropicTransport};
pub use conversation::{
    ContentBlock, HistorySerializer, ImageSource, PlannerMessage, Role, SerializerSettings,
};
pub use normalizer::ActionNormalizer;
pub use openai_compat::{DecisionFormat, OpenAiCompatConfig, OpenAiCompatTransport};
pub use scripted::ScriptedTransport;
pub use tool_calling::{PlannerReply, TokenUsage, ToolCall, ToolCallingPlanner, ToolTransport};

/// Everything a planner may look at to decide the next action.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub goal: &'a str,
    pub context: &'a str,
    pub instructions: &'a [String],
    pub state: &'a BrowserState,
    pub history: &'a [Step],
}

/// Decides the next action. Results are untrusted and get validated by the loop.
#[async_trait]
pub trait ActionPlanner: Send + Sync {
    async fn plan_action(&self, request: PlanRequest<'_>) -> Result<Action, AgentError>;
}
