//! Planner conversation model and the history serializer.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use perceiver_visual::{render_for_planner, RenderRequest, ScreenshotAnnotator};
use pilot_core_types::{ActionId, ActionKind, BrowserState, Step};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AgentError;
use crate::scaling::{PlannerCanvas, Scaling};

pub const COMPUTER_TOOL: &str = "computer";
pub const STOP_TOOL: &str = "stop_browsing";
pub const SWITCH_TAB_TOOL: &str = "switch_tab";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn png(bytes: &[u8]) -> Self {
        Self {
            kind: "base64".to_string(),
            media_type: "image/png".to_string(),
            data: STANDARD.encode(bytes),
        }
    }
}

/// One block of a planner message, in the tool-calling wire shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<ContentBlock>,
    },
    /// Block types the agent does not interpret.
    #[serde(other)]
    Other,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(id: &ActionId, name: &str, input: Value) -> Self {
        Self::ToolUse {
            id: id.as_str().to_string(),
            name: name.to_string(),
            input,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentBlock::Image { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannerMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl PlannerMessage {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Images directly in this message or inside its tool results.
    pub fn images(&self) -> impl Iterator<Item = &ImageSource> {
        self.content.iter().flat_map(|block| {
            let nested: Vec<&ImageSource> = match block {
                ContentBlock::Image { source } => vec![source],
                ContentBlock::ToolResult { content, .. } => content
                    .iter()
                    .filter_map(|inner| match inner {
                        ContentBlock::Image { source } => Some(source),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            nested
        })
    }
}

/// Copy of `messages` with image payloads replaced by their size, for logging.
pub fn redact_images(messages: &[PlannerMessage]) -> Vec<PlannerMessage> {
    fn redact(block: &ContentBlock) -> ContentBlock {
        match block {
            ContentBlock::Image { source } => ContentBlock::Image {
                source: ImageSource {
                    data: format!("<{} base64 chars>", source.data.len()),
                    ..source.clone()
                },
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => ContentBlock::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: content.iter().map(redact).collect(),
            },
            other => other.clone(),
        }
    }

    messages
        .iter()
        .map(|message| PlannerMessage {
            role: message.role,
            content: message.content.iter().map(redact).collect(),
        })
        .collect()
}

/// Knobs shared by every serialization.
#[derive(Clone, Debug)]
pub struct SerializerSettings {
    /// Most recent steps that keep their screenshot.
    pub retention: usize,
    pub canvas: PlannerCanvas,
    pub annotator: ScreenshotAnnotator,
}

impl Default for SerializerSettings {
    fn default() -> Self {
        Self {
            retention: 1,
            canvas: PlannerCanvas::default(),
            annotator: ScreenshotAnnotator::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Instruction,
    Bootstrap,
    Outcome(usize),
    Decision(usize),
    Final,
    Done,
}

/// Replays the goal, every executed step and the current state as planner
/// messages. Pure over its inputs; each instance yields the sequence once.
///
/// Layout: the instruction, a synthetic screenshot request, then for each
/// step the state it was taken against (as the result of the previous tool
/// call) followed by the action itself, and finally the current state.
pub struct HistorySerializer<'a> {
    goal: &'a str,
    context: &'a str,
    current: &'a BrowserState,
    history: &'a [Step],
    settings: &'a SerializerSettings,
    bootstrap_id: ActionId,
    phase: Phase,
}

impl<'a> HistorySerializer<'a> {
    pub fn new(
        goal: &'a str,
        context: &'a str,
        current: &'a BrowserState,
        history: &'a [Step],
        settings: &'a SerializerSettings,
        bootstrap_id: ActionId,
    ) -> Self {
        Self {
            goal,
            context,
            current,
            history,
            settings,
            bootstrap_id,
            phase: Phase::Instruction,
        }
    }

    fn instruction(&self) -> PlannerMessage {
        PlannerMessage::user(vec![ContentBlock::text(format!(
            "Please complete the following task:\n<USER_TASK>\n{}\n</USER_TASK>\n\n\
             Using the supporting contextual data:\n<USER_DATA>\n{}\n</USER_DATA>",
            self.goal, self.context
        ))])
    }

    fn bootstrap(&self) -> PlannerMessage {
        PlannerMessage::assistant(vec![
            ContentBlock::text("Grab a view of the browser to see the starting state."),
            ContentBlock::tool_use(
                &self.bootstrap_id,
                COMPUTER_TOOL,
                json!({ "action": ActionKind::Screenshot.as_str() }),
            ),
        ])
    }

    /// Id of the tool call whose result is the state of step `index`.
    fn result_id(&self, index: usize) -> &ActionId {
        match index.checked_sub(1).and_then(|prev| self.history.get(prev)) {
            Some(step) => &step.action.id,
            None => &self.bootstrap_id,
        }
    }

    fn keeps_screenshot(&self, index: usize) -> bool {
        self.history.len().saturating_sub(index) <= self.settings.retention
    }

    fn outcome(&self, index: usize, state: &BrowserState, detailed: bool) -> Result<PlannerMessage, AgentError> {
        let mut content = Vec::with_capacity(3);
        let mut summary = String::new();
        if detailed {
            let scaling = Scaling::fit(state.viewport, self.settings.canvas);
            let mouse = scaling.to_planner_space(state.mouse);
            summary.push_str(&format!(
                "After action mouse cursor is at X: {}, Y: {}\n\n",
                mouse.x, mouse.y
            ));
        }
        summary.push_str(&format!("Open tabs: {}", tab_summary(state)));
        if detailed {
            summary.push_str("\n\nHere is a screenshot of the browser after the action was performed.");
        }
        content.push(ContentBlock::text(summary));

        if detailed {
            content.push(ContentBlock::Image {
                source: ImageSource::png(&self.render(state)?),
            });
        }

        Ok(PlannerMessage::user(vec![ContentBlock::ToolResult {
            tool_use_id: self.result_id(index).as_str().to_string(),
            content,
        }]))
    }

    fn decision(&self, step: &Step) -> PlannerMessage {
        let mut content = Vec::with_capacity(2);
        if !step.action.reasoning.trim().is_empty() {
            content.push(ContentBlock::text(step.action.reasoning.clone()));
        }
        let (name, input) = replay_call(step, self.settings.canvas);
        content.push(ContentBlock::tool_use(&step.action.id, name, input));
        PlannerMessage::assistant(content)
    }

    fn render(&self, state: &BrowserState) -> Result<Vec<u8>, AgentError> {
        let scaling = Scaling::fit(state.viewport, self.settings.canvas);
        let request = RenderRequest {
            viewport: state.viewport,
            mouse: state.mouse,
            scroll: state.scroll,
            target: scaling.planner_size(),
        };
        Ok(render_for_planner(&state.screenshot, &request, &self.settings.annotator)?.png)
    }

    fn after_step(&self, index: usize) -> Phase {
        if index + 1 < self.history.len() {
            Phase::Outcome(index + 1)
        } else {
            Phase::Final
        }
    }
}

impl<'a> Iterator for HistorySerializer<'a> {
    type Item = Result<PlannerMessage, AgentError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (item, next) = match self.phase {
            Phase::Done => return None,
            Phase::Instruction => (Ok(self.instruction()), Phase::Bootstrap),
            Phase::Bootstrap => {
                let next = if self.history.is_empty() {
                    Phase::Final
                } else {
                    Phase::Outcome(0)
                };
                (Ok(self.bootstrap()), next)
            }
            Phase::Outcome(index) => {
                let step = &self.history[index];
                (
                    self.outcome(index, &step.state, self.keeps_screenshot(index)),
                    Phase::Decision(index),
                )
            }
            Phase::Decision(index) => (
                Ok(self.decision(&self.history[index])),
                self.after_step(index),
            ),
            Phase::Final => (
                self.outcome(self.history.len(), self.current, true),
                Phase::Done,
            ),
        };
        self.phase = if item.is_err() { Phase::Done } else { next };
        Some(item)
    }
}

fn tab_summary(state: &BrowserState) -> Value {
    Value::Array(
        state
            .tabs
            .iter()
            .map(|tab| {
                json!({
                    "tab_id": tab.stable_id,
                    "title": tab.title,
                    "url": tab.url,
                    "active_tab": tab.is_active,
                    "new_tab": tab.is_new,
                })
            })
            .collect(),
    )
}

/// The tool call an executed step is replayed as. Coordinates go back to the
/// planner space of the step's own viewport.
fn replay_call(step: &Step, canvas: PlannerCanvas) -> (&'static str, Value) {
    let action = &step.action;
    match action.kind {
        ActionKind::SwitchTab => (
            SWITCH_TAB_TOOL,
            json!({ "tab_id": action.tab_id().unwrap_or_default() }),
        ),
        ActionKind::ScrollDown => (COMPUTER_TOOL, json!({ "action": "key", "text": "Page_Down" })),
        ActionKind::ScrollUp => (COMPUTER_TOOL, json!({ "action": "key", "text": "Page_Up" })),
        ActionKind::Success => (STOP_TOOL, json!({ "success": true })),
        ActionKind::Failure => (
            STOP_TOOL,
            json!({ "success": false, "error": action.text.clone().unwrap_or_default() }),
        ),
        kind => {
            let mut input = serde_json::Map::new();
            input.insert("action".into(), Value::from(kind.as_str()));
            if let Some(text) = &action.text {
                input.insert("text".into(), Value::from(text.as_str()));
            }
            if let Some(point) = action.coordinate {
                let planner = Scaling::fit(step.state.viewport, canvas).to_planner_space(point);
                input.insert("coordinate".into(), json!([planner.x, planner.y]));
            }
            (COMPUTER_TOOL, Value::Object(input))
        }
    }
}
