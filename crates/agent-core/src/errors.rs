use cdp_adapter::AdapterError;
use perceiver_visual::VisualError;
use thiserror::Error;

/// Errors emitted by the agent-core crate. Each one ends the loop abnormally.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Raised when an agent request is malformed or missing required fields.
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),

    /// A control-surface call failed.
    #[error("control surface failure: {0}")]
    Surface(#[from] AdapterError),

    /// A screenshot could not be prepared for the planner.
    #[error("screenshot processing failed: {0}")]
    Visual(#[from] VisualError),

    /// The planner service could not be reached or answered with garbage.
    #[error("planner transport failure: {0}")]
    PlannerTransport(String),

    /// Configuration values are unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local I/O failed, e.g. the pause prompt could not read stdin.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Helper for wrapping static string errors.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Helper for planner transport failures.
    pub fn planner(message: impl Into<String>) -> Self {
        Self::PlannerTransport(message.into())
    }

    /// Helper for configuration failures.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Why a planner decision was rejected. These never propagate as errors: the
/// message becomes the text of a `failure` action and the loop ends `failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("No text provided for {0}")]
    MissingText(String),

    #[error("No coordinate provided for {0}")]
    MissingCoordinate(String),

    #[error("Missing required field '{field}' for {tool}")]
    MissingField { tool: String, field: String },

    #[error("Unsupported computer action: {0}")]
    UnknownAction(String),

    #[error("Invalid tab ID provided for switch_tab")]
    InvalidTabId,

    #[error("No open tab with id {0}")]
    UnresolvedTab(u32),

    #[error("Wrong tool called: {0}")]
    WrongTool(String),

    #[error("Planner reply contained no tool call")]
    NoDecision,

    #[error("Unknown error")]
    UnspecifiedFailure,
}
