//! Vision-guided browser agent core.
//!
//! Holds the coordinate scaler, the snapshot builder, the planner protocol
//! (history serialization and decision normalization) and the agent loop that
//! ties them to a [`cdp_adapter::ControlSurface`].

pub mod agent_loop;
pub mod errors;
pub mod ids;
pub mod planner;
pub mod scaling;

pub use agent_loop::{AgentConfig, AgentOutcome, BrowserAgent, SnapshotBuilder, TabRegistry};
pub use errors::{AgentError, DecisionError};
pub use ids::{CorrelationIdSource, SequentialIdSource, UuidIdSource};
pub use planner::{
    ActionNormalizer, ActionPlanner, AnthropicConfig, AnthropicTransport, DecisionFormat,
    HistorySerializer, OpenAiCompatConfig, OpenAiCompatTransport, PlanRequest, ScriptedTransport,
    ToolCallingPlanner, ToolTransport,
};
pub use scaling::{PlannerCanvas, Scaling};
