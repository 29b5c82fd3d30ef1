//! Turns a planner reply into one executable [`Action`].

use pilot_core_types::{Action, ActionId, ActionKind, BrowserState, Coordinate};
use serde_json::Value;
use tracing::debug;

use super::conversation::{ContentBlock, COMPUTER_TOOL, STOP_TOOL, SWITCH_TAB_TOOL};
use crate::errors::DecisionError;
use crate::ids::CorrelationIdSource;
use crate::scaling::Scaling;

/// What a tool call resolved to, before reasoning and id are attached.
#[derive(Debug, Clone, PartialEq)]
struct Decision {
    kind: ActionKind,
    text: Option<String>,
    coordinate: Option<Coordinate>,
}

impl Decision {
    fn bare(kind: ActionKind) -> Self {
        Self {
            kind,
            text: None,
            coordinate: None,
        }
    }

    fn with_text(kind: ActionKind, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::bare(kind)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionNormalizer {
    jitter_tolerance: u32,
}

impl Default for ActionNormalizer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ActionNormalizer {
    pub fn new(jitter_tolerance: u32) -> Self {
        Self { jitter_tolerance }
    }

    /// Never fails: anything invalid in the reply becomes a `failure` action
    /// whose text explains what was wrong.
    pub fn normalize(
        &self,
        content: &[ContentBlock],
        scaling: &Scaling,
        state: &BrowserState,
        ids: &dyn CorrelationIdSource,
    ) -> Action {
        let call = content.iter().enumerate().rev().find_map(|(index, block)| match block {
            ContentBlock::ToolUse { id, name, input } => Some((index, id, name, input)),
            _ => None,
        });

        let Some((index, id, name, input)) = call else {
            let reasoning = narrative(content);
            return Action::failure(DecisionError::NoDecision.to_string(), ids.next_id())
                .with_reasoning(reasoning);
        };

        let id = if id.trim().is_empty() {
            ids.next_id()
        } else {
            ActionId::new(id.clone())
        };
        let reasoning = narrative(&content[..index]);

        let decision = self
            .decide(name, input, scaling, state)
            .unwrap_or_else(|err| Decision::with_text(ActionKind::Failure, err.to_string()));
        debug!(tool = %name, action = %decision.kind, "normalized planner decision");

        Action {
            kind: decision.kind,
            text: decision.text,
            coordinate: decision.coordinate,
            reasoning,
            id,
        }
    }

    fn decide(
        &self,
        tool: &str,
        input: &Value,
        scaling: &Scaling,
        state: &BrowserState,
    ) -> Result<Decision, DecisionError> {
        match tool {
            STOP_TOOL => {
                let success = input
                    .get("success")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| missing_field(tool, "success"))?;
                if success {
                    return Ok(Decision::bare(ActionKind::Success));
                }
                let error = input
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|text| !text.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| DecisionError::UnspecifiedFailure.to_string());
                Ok(Decision::with_text(ActionKind::Failure, error))
            }
            SWITCH_TAB_TOOL => switch_tab(input.get("tab_id"), state),
            COMPUTER_TOOL => self.computer(input, scaling, state),
            other => Err(DecisionError::WrongTool(other.to_string())),
        }
    }

    fn computer(
        &self,
        input: &Value,
        scaling: &Scaling,
        state: &BrowserState,
    ) -> Result<Decision, DecisionError> {
        let action = input
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field(COMPUTER_TOOL, "action"))?;
        let text = input
            .get("text")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty());

        match action {
            "key" => {
                let text = text.ok_or_else(|| DecisionError::MissingText(action.to_string()))?;
                Ok(match scroll_key(text) {
                    Some(kind) => Decision::bare(kind),
                    None => Decision::with_text(ActionKind::Key, text),
                })
            }
            "type" => {
                let text = text.ok_or_else(|| DecisionError::MissingText(action.to_string()))?;
                Ok(Decision::with_text(ActionKind::Type, text))
            }
            "mouse_move" | "left_click_drag" => {
                let planner = input
                    .get("coordinate")
                    .and_then(parse_coordinate)
                    .ok_or_else(|| DecisionError::MissingCoordinate(action.to_string()))?;
                let target = scaling.to_browser_space(planner);

                if action == "mouse_move" {
                    let distance = target.chebyshev_distance(&state.mouse);
                    if distance <= self.jitter_tolerance {
                        debug!(distance, "mouse_move within jitter tolerance, clicking instead");
                        return Ok(Decision::bare(ActionKind::LeftClick));
                    }
                }

                let kind = if action == "mouse_move" {
                    ActionKind::MouseMove
                } else {
                    ActionKind::LeftClickDrag
                };
                Ok(Decision {
                    coordinate: Some(target),
                    ..Decision::bare(kind)
                })
            }
            "switch_tab" => {
                let id = text.map(|text| Value::String(text.to_string()));
                switch_tab(id.as_ref(), state)
            }
            "left_click" | "right_click" | "middle_click" | "double_click" | "screenshot"
            | "cursor_position" => action
                .parse::<ActionKind>()
                .map(Decision::bare)
                .map_err(|_| DecisionError::UnknownAction(action.to_string())),
            other => Err(DecisionError::UnknownAction(other.to_string())),
        }
    }
}

fn missing_field(tool: &str, field: &str) -> DecisionError {
    DecisionError::MissingField {
        tool: tool.to_string(),
        field: field.to_string(),
    }
}

fn switch_tab(raw: Option<&Value>, state: &BrowserState) -> Result<Decision, DecisionError> {
    let stable_id = raw.and_then(parse_tab_id).ok_or(DecisionError::InvalidTabId)?;
    if state.tab_by_stable_id(stable_id).is_none() {
        return Err(DecisionError::UnresolvedTab(stable_id));
    }
    Ok(Decision::with_text(ActionKind::SwitchTab, stable_id.to_string()))
}

fn parse_tab_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|id| u32::try_from(id).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// `page_down` / `Page_Up` and spelling variants.
fn scroll_key(text: &str) -> Option<ActionKind> {
    let squashed: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect();
    match squashed.as_str() {
        "pagedown" => Some(ActionKind::ScrollDown),
        "pageup" => Some(ActionKind::ScrollUp),
        _ => None,
    }
}

/// Accepts `[x, y]`, `{"x": .., "y": ..}` or a string holding either.
/// Negative components clamp to 0.
fn parse_coordinate(value: &Value) -> Option<Coordinate> {
    match value {
        Value::Array(items) => match items.as_slice() {
            [x, y] => Some(Coordinate::new(component(x)?, component(y)?)),
            _ => None,
        },
        Value::Object(map) => Some(Coordinate::new(
            component(map.get("x")?)?,
            component(map.get("y")?)?,
        )),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(inner @ (Value::Array(_) | Value::Object(_))) => parse_coordinate(&inner),
            _ => None,
        },
        _ => None,
    }
}

fn component(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.max(0.0).round().min(u32::MAX as f64) as u32)
}

fn narrative(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.trim()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdSource;
    use crate::scaling::PlannerCanvas;
    use pilot_core_types::{ScrollIndicator, Tab, TabHandle, ViewportSize};
    use serde_json::json;

    fn state() -> BrowserState {
        BrowserState {
            screenshot: Vec::new(),
            viewport: ViewportSize::new(1920, 1080),
            scroll: ScrollIndicator::full_page(),
            tabs: vec![Tab {
                handle: TabHandle::new("A"),
                url: "https://example.com/".into(),
                title: "Example".into(),
                is_active: true,
                is_new: false,
                stable_id: 0,
            }],
            active_tab: TabHandle::new("A"),
            mouse: Coordinate::new(100, 100),
        }
    }

    fn normalize(blocks: Vec<ContentBlock>) -> Action {
        normalize_in(state(), blocks)
    }

    fn normalize_in(state: BrowserState, blocks: Vec<ContentBlock>) -> Action {
        let scaling = Scaling::fit(state.viewport, PlannerCanvas::default());
        ActionNormalizer::default().normalize(
            &blocks,
            &scaling,
            &state,
            &SequentialIdSource::new("fresh-"),
        )
    }

    fn call(name: &str, input: Value) -> ContentBlock {
        ContentBlock::ToolUse {
            id: "toolu_1".into(),
            name: name.into(),
            input,
        }
    }

    #[test]
    fn mouse_move_is_scaled_to_browser_space() {
        let action = normalize(vec![call(
            COMPUTER_TOOL,
            json!({ "action": "mouse_move", "coordinate": [640, 400] }),
        )]);
        assert_eq!(action.kind, ActionKind::MouseMove);
        assert_eq!(action.coordinate, Some(Coordinate::new(960, 600)));
        assert_eq!(action.id.as_str(), "toolu_1");
    }

    #[test]
    fn tiny_mouse_move_becomes_click() {
        // planner (68, 68) -> browser (102, 102), two pixels from the pointer
        let action = normalize(vec![call(
            COMPUTER_TOOL,
            json!({ "action": "mouse_move", "coordinate": [68, 68] }),
        )]);
        assert_eq!(action.kind, ActionKind::LeftClick);
        assert_eq!(action.coordinate, None);
    }

    #[test]
    fn jitter_tolerance_is_inclusive() {
        // 1280x800 viewport: planner space equals browser space
        let state = BrowserState {
            viewport: ViewportSize::new(1280, 800),
            ..state()
        };
        let at_tolerance = normalize_in(
            state.clone(),
            vec![call(COMPUTER_TOOL, json!({ "action": "mouse_move", "coordinate": [105, 100] }))],
        );
        assert_eq!(at_tolerance.kind, ActionKind::LeftClick);
        assert_eq!(at_tolerance.coordinate, None);

        let past_tolerance = normalize_in(
            state,
            vec![call(COMPUTER_TOOL, json!({ "action": "mouse_move", "coordinate": [106, 94] }))],
        );
        assert_eq!(past_tolerance.kind, ActionKind::MouseMove);
        assert_eq!(past_tolerance.coordinate, Some(Coordinate::new(106, 94)));
    }

    #[test]
    fn distant_mouse_move_stays_a_move() {
        let action = normalize(vec![call(
            COMPUTER_TOOL,
            json!({ "action": "mouse_move", "coordinate": [80, 80] }),
        )]);
        assert_eq!(action.kind, ActionKind::MouseMove);
        assert_eq!(action.coordinate, Some(Coordinate::new(120, 120)));
    }

    #[test]
    fn drag_near_pointer_is_not_a_click() {
        let action = normalize(vec![call(
            COMPUTER_TOOL,
            json!({ "action": "left_click_drag", "coordinate": [68, 68] }),
        )]);
        assert_eq!(action.kind, ActionKind::LeftClickDrag);
    }

    #[test]
    fn page_keys_become_scrolls() {
        for (text, kind) in [
            ("Page_Down", ActionKind::ScrollDown),
            ("page_up", ActionKind::ScrollUp),
            ("PAGEDOWN", ActionKind::ScrollDown),
        ] {
            let action = normalize(vec![call(COMPUTER_TOOL, json!({ "action": "key", "text": text }))]);
            assert_eq!(action.kind, kind, "{}", text);
            assert_eq!(action.text, None);
        }
        let action = normalize(vec![call(COMPUTER_TOOL, json!({ "action": "key", "text": "ctrl+l" }))]);
        assert_eq!(action.kind, ActionKind::Key);
        assert_eq!(action.text.as_deref(), Some("ctrl+l"));
    }

    #[test]
    fn missing_fields_fail_with_a_reason() {
        let action = normalize(vec![call(COMPUTER_TOOL, json!({ "action": "type" }))]);
        assert_eq!(action.kind, ActionKind::Failure);
        assert_eq!(action.text.as_deref(), Some("No text provided for type"));

        let action = normalize(vec![call(COMPUTER_TOOL, json!({ "action": "mouse_move" }))]);
        assert_eq!(action.text.as_deref(), Some("No coordinate provided for mouse_move"));

        let action = normalize(vec![call(COMPUTER_TOOL, json!({ "action": "triple_click" }))]);
        assert_eq!(action.text.as_deref(), Some("Unsupported computer action: triple_click"));
    }

    #[test]
    fn stop_browsing_maps_to_terminal_actions() {
        let action = normalize(vec![call(STOP_TOOL, json!({ "success": true }))]);
        assert_eq!(action.kind, ActionKind::Success);

        let action = normalize(vec![call(STOP_TOOL, json!({ "success": false, "error": "captcha" }))]);
        assert_eq!(action.kind, ActionKind::Failure);
        assert_eq!(action.text.as_deref(), Some("captcha"));

        let action = normalize(vec![call(STOP_TOOL, json!({ "success": false }))]);
        assert_eq!(action.text.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn switch_tab_requires_a_known_tab() {
        let action = normalize(vec![call(SWITCH_TAB_TOOL, json!({ "tab_id": 0 }))]);
        assert_eq!(action.kind, ActionKind::SwitchTab);
        assert_eq!(action.tab_id(), Some(0));

        let action = normalize(vec![call(SWITCH_TAB_TOOL, json!({ "tab_id": 7 }))]);
        assert_eq!(action.kind, ActionKind::Failure);
        assert_eq!(action.text.as_deref(), Some("No open tab with id 7"));

        let action = normalize(vec![call(SWITCH_TAB_TOOL, json!({ "tab_id": "first" }))]);
        assert_eq!(
            action.text.as_deref(),
            Some("Invalid tab ID provided for switch_tab")
        );
    }

    #[test]
    fn reasoning_joins_text_before_the_last_call() {
        let action = normalize(vec![
            ContentBlock::text("The form is below."),
            ContentBlock::text("Scrolling."),
            call(COMPUTER_TOOL, json!({ "action": "screenshot" })),
            ContentBlock::text("trailing"),
        ]);
        assert_eq!(action.kind, ActionKind::Screenshot);
        assert_eq!(action.reasoning, "The form is below. Scrolling.");
    }

    #[test]
    fn reply_without_tool_call_fails_with_fresh_id() {
        let action = normalize(vec![ContentBlock::text("I am done")]);
        assert_eq!(action.kind, ActionKind::Failure);
        assert_eq!(action.id.as_str(), "fresh-0");
        assert_eq!(action.reasoning, "I am done");
    }

    #[test]
    fn wrong_tool_fails() {
        let action = normalize(vec![call("bash", json!({ "command": "ls" }))]);
        assert_eq!(action.text.as_deref(), Some("Wrong tool called: bash"));
    }

    #[test]
    fn lenient_coordinates() {
        assert_eq!(parse_coordinate(&json!([3, 4])), Some(Coordinate::new(3, 4)));
        assert_eq!(parse_coordinate(&json!({ "x": 3, "y": 4.4 })), Some(Coordinate::new(3, 4)));
        assert_eq!(parse_coordinate(&json!("[3, 4]")), Some(Coordinate::new(3, 4)));
        assert_eq!(parse_coordinate(&json!([-5, 4])), Some(Coordinate::new(0, 4)));
        assert_eq!(parse_coordinate(&json!("\"[3,4]\"")), None);
        assert_eq!(parse_coordinate(&json!([3])), None);
    }
}
