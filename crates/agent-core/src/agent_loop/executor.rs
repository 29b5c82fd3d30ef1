//! Executes one normalized action against the control surface.

use cdp_adapter::{ClickKind, ControlSurface, KeyChord};
use pilot_core_types::{Action, ActionKind, BrowserState};
use tracing::debug;

use super::snapshot::TabRegistry;
use crate::errors::AgentError;

/// Scroll distance as a fraction of the viewport height.
const SCROLL_FRACTION: (i64, i64) = (3, 4);

/// Performs `action`. `state` is the snapshot the action was decided on.
pub async fn execute_action(
    surface: &dyn ControlSurface,
    action: &Action,
    state: &BrowserState,
    registry: &TabRegistry,
) -> Result<(), AgentError> {
    debug!(action = %action.kind, id = %action.id, "executing action");
    match action.kind {
        ActionKind::Key => {
            let chords = KeyChord::parse_sequence(required_text(action)?);
            surface.send_keys(&chords).await?;
        }
        ActionKind::Type => {
            surface.send_keys(&[KeyChord::text(required_text(action)?)]).await?;
        }
        ActionKind::MouseMove => {
            surface.move_mouse(required_coordinate(action)?).await?;
        }
        ActionKind::LeftClickDrag => {
            surface.drag_to(required_coordinate(action)?).await?;
        }
        ActionKind::LeftClick => surface.click(ClickKind::Left).await?,
        ActionKind::RightClick => surface.click(ClickKind::Right).await?,
        ActionKind::MiddleClick => surface.click(ClickKind::Middle).await?,
        ActionKind::DoubleClick => surface.click(ClickKind::Double).await?,
        ActionKind::ScrollDown => surface.scroll_by(scroll_distance(state)).await?,
        ActionKind::ScrollUp => surface.scroll_by(-scroll_distance(state)).await?,
        // Every step captures a screenshot and the pointer anyway.
        ActionKind::Screenshot | ActionKind::CursorPosition => {}
        ActionKind::SwitchTab => {
            let stable_id = action
                .tab_id()
                .ok_or_else(|| AgentError::invalid_request("switch_tab without a tab id"))?;
            let handle = registry.handle_for(stable_id).ok_or_else(|| {
                AgentError::invalid_request(format!("no tab registered with id {}", stable_id))
            })?;
            surface.switch_to_tab(handle).await?;
        }
        ActionKind::Success | ActionKind::Failure => {
            return Err(AgentError::invalid_request(format!(
                "terminal action {} cannot be executed",
                action.kind
            )));
        }
    }
    Ok(())
}

fn scroll_distance(state: &BrowserState) -> i32 {
    let (num, den) = SCROLL_FRACTION;
    (state.viewport.height as i64 * num / den) as i32
}

fn required_text(action: &Action) -> Result<&str, AgentError> {
    action
        .text
        .as_deref()
        .filter(|text| !text.is_empty())
        .ok_or_else(|| AgentError::invalid_request(format!("{} requires text", action.kind)))
}

fn required_coordinate(action: &Action) -> Result<pilot_core_types::Coordinate, AgentError> {
    action
        .coordinate
        .ok_or_else(|| AgentError::invalid_request(format!("{} requires a coordinate", action.kind)))
}
