//! Anthropic Messages API transport with the computer-use tools.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::conversation::{ContentBlock, PlannerMessage, COMPUTER_TOOL, STOP_TOOL, SWITCH_TAB_TOOL};
use super::tool_calling::{dump_last_image, PlannerReply, TokenUsage, ToolCall, ToolTransport};
use crate::errors::AgentError;
use pilot_core_types::ViewportSize;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Value of the `anthropic-beta` header; `None` omits it.
    pub beta: Option<String>,
    /// Tool type advertised for the computer tool.
    pub computer_tool: String,
    /// Every screenshot sent is also written here when set.
    pub debug_image_path: Option<PathBuf>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.anthropic.com/v1".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(120),
            beta: Some("computer-use-2024-10-22".to_string()),
            computer_tool: "computer_20241022".to_string(),
            debug_image_path: None,
        }
    }
}

pub struct AnthropicTransport {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicTransport {
    pub fn new(config: AnthropicConfig) -> Result<Self, AgentError> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::config("Anthropic API key is not set"));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AgentError::config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    fn tools(&self, display: ViewportSize) -> Vec<Value> {
        tool_definitions(&self.config.computer_tool, display)
    }
}

#[async_trait]
impl ToolTransport for AnthropicTransport {
    async fn complete(&self, call: ToolCall<'_>) -> Result<PlannerReply, AgentError> {
        dump_last_image(self.config.debug_image_path.as_deref(), call.messages).await;

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: call.system,
            tools: self.tools(call.display),
            messages: call.messages,
        };
        let url = format!("{}/messages", self.config.api_base.trim_end_matches('/'));
        debug!(%url, model = %self.config.model, messages = call.messages.len(), "sending planner request");

        let mut builder = self
            .client
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION);
        if let Some(beta) = &self.config.beta {
            builder = builder.header("anthropic-beta", beta);
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::planner(format!("anthropic request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(AgentError::planner(format!(
                "anthropic returned {}: {}",
                status, text
            )));
        }

        let response: MessagesResponse = response
            .json()
            .await
            .map_err(|err| AgentError::planner(format!("anthropic response invalid: {err}")))?;
        debug!(stop_reason = ?response.stop_reason, blocks = response.content.len(), "planner reply");

        Ok(PlannerReply {
            content: response.content,
            usage: response.usage,
        })
    }
}

/// The computer, switch_tab and stop_browsing tool definitions.
pub fn tool_definitions(computer_tool: &str, display: ViewportSize) -> Vec<Value> {
    vec![
        json!({
            "type": computer_tool,
            "name": COMPUTER_TOOL,
            "display_width_px": display.width,
            "display_height_px": display.height,
            "display_number": 1,
        }),
        json!({
            "name": SWITCH_TAB_TOOL,
            "description": "Switch to another open browser tab, identified by the tab_id listed with the open tabs.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "tab_id": {
                        "type": "integer",
                        "description": "The tab_id of the tab to switch to."
                    }
                },
                "required": ["tab_id"]
            }
        }),
        json!({
            "name": STOP_TOOL,
            "description": "Stop browsing when the task is complete, or when it cannot be completed.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "success": {
                        "type": "boolean",
                        "description": "Whether the task was completed."
                    },
                    "error": {
                        "type": "string",
                        "description": "Why the task could not be completed."
                    }
                },
                "required": ["success"]
            }
        }),
    ]
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    tools: Vec<Value>,
    messages: &'a [PlannerMessage],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
