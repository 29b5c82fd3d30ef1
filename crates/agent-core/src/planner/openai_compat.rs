//! OpenAI-compatible chat-completions transport (vLLM and similar servers).
//!
//! The serialized conversation is re-expressed as chat messages: tool calls
//! become function calls named after the computer action, tool results become
//! `tool` messages, and screenshots travel as `image_url` data URLs. The reply
//! is either a native function call or a structured JSON decision whose
//! `next_action` names the function. Both are mapped back onto the computer,
//! switch_tab and stop_browsing tool calls, so [`ActionNormalizer`] validates
//! them like any other reply.
//!
//! [`ActionNormalizer`]: super::ActionNormalizer

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use pilot_core_types::ViewportSize;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::conversation::{
    ContentBlock, PlannerMessage, Role, COMPUTER_TOOL, STOP_TOOL, SWITCH_TAB_TOOL,
};
use super::tool_calling::{dump_last_image, PlannerReply, TokenUsage, ToolCall, ToolTransport};
use crate::errors::AgentError;

/// How the model is asked to express its decision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionFormat {
    /// vLLM `guided_json`: the reply content is constrained to the decision schema.
    #[default]
    GuidedJson,
    /// `response_format: json_object`; the schema is only described in the prompt.
    JsonObject,
    /// Native function calling with `tool_choice: required`.
    ToolCalls,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiCompatConfig {
    /// Sent as a bearer token when non-empty. Local servers usually need none.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    #[serde(with = "super::anthropic::duration_secs")]
    pub timeout: Duration,
    pub decision_format: DecisionFormat,
    /// Every screenshot sent is also written here when set.
    pub debug_image_path: Option<PathBuf>,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "http://localhost:8000/v1".to_string(),
            model: "Qwen/Qwen2-VL-72B-Instruct".to_string(),
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(120),
            decision_format: DecisionFormat::default(),
            debug_image_path: None,
        }
    }
}

pub struct OpenAiCompatTransport {
    client: Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatTransport {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, AgentError> {
        if config.model.trim().is_empty() {
            return Err(AgentError::config("chat completions model is not set"));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AgentError::config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    fn request<'a>(&'a self, call: &ToolCall<'_>) -> ChatRequest<'a> {
        let format = self.config.decision_format;
        let mut request = ChatRequest {
            model: &self.config.model,
            messages: chat_messages(&system_text(call.system, call.display, format), call.messages),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            guided_json: None,
            response_format: None,
            tools: None,
            tool_choice: None,
        };
        match format {
            DecisionFormat::GuidedJson => request.guided_json = Some(decision_schema()),
            DecisionFormat::JsonObject => {
                request.response_format = Some(json!({ "type": "json_object" }))
            }
            DecisionFormat::ToolCalls => {
                request.tools = Some(function_definitions());
                request.tool_choice = Some("required");
            }
        }
        request
    }
}

#[async_trait]
impl ToolTransport for OpenAiCompatTransport {
    async fn complete(&self, call: ToolCall<'_>) -> Result<PlannerReply, AgentError> {
        dump_last_image(self.config.debug_image_path.as_deref(), call.messages).await;

        let body = self.request(&call);
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        debug!(
            %url,
            model = %self.config.model,
            messages = body.messages.len(),
            format = ?self.config.decision_format,
            "sending planner request"
        );

        let mut builder = self.client.post(&url);
        if !self.config.api_key.trim().is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }
        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::planner(format!("chat completions request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(AgentError::planner(format!(
                "chat completions returned {}: {}",
                status, text
            )));
        }

        let response: ChatCompletionResponse = response.json().await.map_err(|err| {
            AgentError::planner(format!("chat completions response invalid: {err}"))
        })?;
        reply_from_chat(response)
    }
}

/// Appends the screenshot geometry and, unless native function calling is
/// used, the decision format to the shared system prompt.
fn system_text(system: &str, display: ViewportSize, format: DecisionFormat) -> String {
    let mut text = format!(
        "{}\n\n<SCREEN>\n* Screenshots are {}x{} pixels. Coordinates are [x, y] pixel positions in the screenshot.\n</SCREEN>",
        system, display.width, display.height
    );
    if format != DecisionFormat::ToolCalls {
        let functions =
            serde_json::to_string_pretty(&function_definitions()).unwrap_or_default();
        text.push_str(&format!(
            "\n\nYou have access to the following functions:\n<FUNCTION_CALLS>\n{}\n</FUNCTION_CALLS>\n\n\
             <RESPONSE_FORMAT>\n\
             Reply with a single JSON object with these fields:\n\
             * \"review_of_prior_steps\": what has been done so far and whether the last action worked.\n\
             * \"current_state\": the current page as it relates to the task.\n\
             * \"current_mouse_analysis\": where the mouse is relative to the UI elements.\n\
             * \"next_action_plan\": the chosen action and the exact change it should cause.\n\
             * \"next_action\": the function to call, as {{\"name\": <function name>, ...arguments}}.\n\
             </RESPONSE_FORMAT>",
            functions
        ));
    }
    text
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guided_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ChatContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: &'static str, content: Option<ChatContent>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as the chat API carries them.
    #[serde(default)]
    pub arguments: String,
}

/// Re-expresses the planner conversation as chat messages.
///
/// Tool results become `tool` messages answering the assistant's function
/// call. Chat servers reject images inside `tool` messages, so the screenshot
/// of a result follows in a user message.
pub fn chat_messages(system: &str, messages: &[PlannerMessage]) -> Vec<ChatMessage> {
    let mut chat = vec![ChatMessage::new("system", Some(ChatContent::Text(system.to_string())))];
    for message in messages {
        match message.role {
            Role::User => push_user(&mut chat, &message.content),
            Role::Assistant => chat.push(assistant_message(&message.content)),
        }
    }
    chat
}

fn push_user(chat: &mut Vec<ChatMessage>, blocks: &[ContentBlock]) {
    let mut parts = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                let text = joined_text(content);
                chat.push(ChatMessage {
                    tool_call_id: Some(tool_use_id.clone()),
                    ..ChatMessage::new("tool", Some(ChatContent::Text(text)))
                });
                parts.extend(content.iter().filter_map(image_part));
            }
            ContentBlock::Text { text } => parts.push(ChatPart::Text { text: text.clone() }),
            other => parts.extend(image_part(other)),
        }
    }
    if !parts.is_empty() {
        chat.push(ChatMessage::new("user", Some(ChatContent::Parts(parts))));
    }
}

fn assistant_message(blocks: &[ContentBlock]) -> ChatMessage {
    let text = joined_text(blocks);
    let tool_calls = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(function_call(id, name, input)),
            _ => None,
        })
        .collect();
    ChatMessage {
        tool_calls,
        ..ChatMessage::new("assistant", (!text.is_empty()).then_some(ChatContent::Text(text)))
    }
}

fn joined_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn image_part(block: &ContentBlock) -> Option<ChatPart> {
    match block {
        ContentBlock::Image { source } => Some(ChatPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", source.media_type, source.data),
            },
        }),
        _ => None,
    }
}

/// `computer {action: "mouse_move", coordinate}` becomes
/// `mouse_move {coordinate}`; the control tools keep their names.
fn function_call(id: &str, tool: &str, input: &Value) -> ChatToolCall {
    let (name, arguments) = match (tool, input) {
        (COMPUTER_TOOL, Value::Object(fields)) => {
            let mut fields = fields.clone();
            let name = match fields.remove("action") {
                Some(Value::String(action)) => action,
                _ => "screenshot".to_string(),
            };
            (name, Value::Object(fields))
        }
        _ => (tool.to_string(), input.clone()),
    };
    ChatToolCall {
        id: id.to_string(),
        kind: function_kind(),
        function: FunctionCall {
            name,
            arguments: arguments.to_string(),
        },
    }
}

/// Inverse of [`function_call`]. `wait` has no action of its own and becomes
/// a screenshot, which re-observes the page after the step delay.
fn tool_use(id: String, name: &str, arguments: Value) -> ContentBlock {
    match name {
        STOP_TOOL | SWITCH_TAB_TOOL => ContentBlock::ToolUse {
            id,
            name: name.to_string(),
            input: arguments,
        },
        _ => {
            let mut fields = match arguments {
                Value::Object(fields) => fields,
                _ => Map::new(),
            };
            let action = if name == "wait" {
                fields.clear();
                "screenshot"
            } else {
                name
            };
            fields.insert("action".to_string(), Value::String(action.to_string()));
            ContentBlock::ToolUse {
                id,
                name: COMPUTER_TOOL.to_string(),
                input: Value::Object(fields),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatReplyMessage {
    #[serde(default)]
    pub content: Option<ChatReplyContent>,
    #[serde(default)]
    pub tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChatReplyContent {
    Text(String),
    Parts(Vec<ChatReplyPart>),
}

impl ChatReplyContent {
    fn as_text(&self) -> String {
        match self {
            ChatReplyContent::Text(text) => text.clone(),
            ChatReplyContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatReplyPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Maps a chat completion onto tool-calling content blocks.
///
/// Function calls win over content. Content that is not a structured decision
/// is kept as text, which the normalizer reports as a reply without a tool call.
pub fn reply_from_chat(response: ChatCompletionResponse) -> Result<PlannerReply, AgentError> {
    let usage = response.usage.map(|usage| TokenUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    });
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| AgentError::planner("chat completions returned no choices"))?;

    let text = message
        .content
        .as_ref()
        .map(ChatReplyContent::as_text)
        .unwrap_or_default();
    let mut content = Vec::new();

    if !message.tool_calls.is_empty() {
        if !text.trim().is_empty() {
            content.push(ContentBlock::text(text));
        }
        for call in message.tool_calls {
            let arguments = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
            content.push(tool_use(call.id, &call.function.name, arguments));
        }
    } else if let Some(decision) = structured_decision(&text) {
        content.extend(decision);
    } else if !text.trim().is_empty() {
        content.push(ContentBlock::text(text));
    }

    debug!(blocks = content.len(), "planner reply");
    Ok(PlannerReply { content, usage })
}

/// The analysis fields become the reasoning text; `next_action` becomes the
/// tool call. Its id is left empty so the normalizer assigns a fresh one.
fn structured_decision(raw: &str) -> Option<Vec<ContentBlock>> {
    let Value::Object(mut fields) = json_object(raw)? else {
        return None;
    };
    let Value::Object(mut next_action) = fields.remove("next_action")? else {
        return None;
    };
    let name = match next_action.remove("name")? {
        Value::String(name) => name,
        _ => return None,
    };

    let mut blocks = Vec::with_capacity(2);
    if !fields.is_empty() {
        blocks.push(ContentBlock::text(Value::Object(fields).to_string()));
    }
    blocks.push(tool_use(String::new(), &name, Value::Object(next_action)));
    Some(blocks)
}

/// First `{` to last `}`; tolerates code fences and chatter around the object.
fn json_object(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Value>(&raw[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// One entry per function: name, description, parameter schema.
fn functions() -> Vec<(&'static str, &'static str, Value)> {
    let coordinate = json!({
        "type": "array",
        "items": { "type": "integer" },
        "minItems": 2,
        "maxItems": 2,
        "description": "[x, y] position in the screenshot."
    });
    let text = json!({ "type": "string" });
    let none = json!({ "type": "object", "properties": {}, "required": [] });
    vec![
        ("type", "Type a string of text on the keyboard.", json!({
            "type": "object", "properties": { "text": text }, "required": ["text"]
        })),
        ("key", "Press a key or key combination, in xdotool syntax: 'Return', 'ctrl+a', 'Page_Down'.", json!({
            "type": "object", "properties": { "text": text }, "required": ["text"]
        })),
        ("mouse_move", "Move the mouse cursor to a position on the screen.", json!({
            "type": "object", "properties": { "coordinate": coordinate }, "required": ["coordinate"]
        })),
        ("left_click", "Click the left mouse button at the current cursor position.", none.clone()),
        ("left_click_drag", "Press the left button at the cursor, drag to a position and release.", json!({
            "type": "object", "properties": { "coordinate": coordinate }, "required": ["coordinate"]
        })),
        ("right_click", "Click the right mouse button at the current cursor position.", none.clone()),
        ("middle_click", "Click the middle mouse button at the current cursor position.", none.clone()),
        ("double_click", "Double-click the left mouse button at the current cursor position.", none.clone()),
        ("screenshot", "Take a new screenshot of the page.", none.clone()),
        ("wait", "Wait for the page to settle, then take a new screenshot.", none),
        (SWITCH_TAB_TOOL, "Switch to another open browser tab, identified by the tab_id listed with the open tabs.", json!({
            "type": "object",
            "properties": { "tab_id": { "type": "integer" } },
            "required": ["tab_id"]
        })),
        (STOP_TOOL, "Stop browsing when the task is complete, or when it cannot be completed.", json!({
            "type": "object",
            "properties": {
                "success": { "type": "boolean" },
                "error": { "type": "string" }
            },
            "required": ["success"]
        })),
    ]
}

/// Function definitions in the chat-completions `tools` shape.
pub fn function_definitions() -> Vec<Value> {
    functions()
        .into_iter()
        .map(|(name, description, parameters)| {
            json!({
                "type": "function",
                "function": { "name": name, "description": description, "parameters": parameters }
            })
        })
        .collect()
}

/// JSON schema of the structured decision, with `next_action` as a union of
/// the functions discriminated by `name`.
pub fn decision_schema() -> Value {
    let variants: Vec<Value> = functions()
        .into_iter()
        .map(|(name, _, parameters)| {
            let mut properties = parameters
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            properties.insert("name".to_string(), json!({ "const": name }));
            let mut required = vec![json!("name")];
            if let Some(fields) = parameters.get("required").and_then(Value::as_array) {
                required.extend(fields.iter().cloned());
            }
            json!({ "type": "object", "properties": properties, "required": required })
        })
        .collect();

    json!({
        "type": "object",
        "properties": {
            "review_of_prior_steps": { "type": "string" },
            "current_state": { "type": "string" },
            "current_mouse_analysis": { "type": "string" },
            "next_action_plan": { "type": "string" },
            "next_action": { "oneOf": variants }
        },
        "required": [
            "review_of_prior_steps",
            "current_state",
            "current_mouse_analysis",
            "next_action_plan",
            "next_action"
        ]
    })
}
