//! Shared primitives for the pilot agent: browser snapshots, the closed action
//! set and the loop status.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Raised when an action name is outside the recognised set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown action kind: {0}")]
pub struct UnknownActionKind(pub String);

/// Pixel position. Which space (browser or planner) it lives in is decided by
/// the holder, never by the value.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl Coordinate {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Largest per-axis distance to `other`.
    pub fn chebyshev_distance(&self, other: &Coordinate) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Vertical scroll position of the page, both fields in `[0, 1]`.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollIndicator {
    /// Fraction of the page scrolled past.
    pub offset: f64,
    /// Fraction of the page visible in the viewport.
    pub height: f64,
}

impl ScrollIndicator {
    pub fn new(offset: f64, height: f64) -> Self {
        Self {
            offset: clamp_unit(offset),
            height: clamp_unit(height),
        }
    }

    /// Whole page visible, nothing scrolled.
    pub fn full_page() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl Default for ScrollIndicator {
    fn default() -> Self {
        Self::full_page()
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Opaque, driver-assigned tab identifier. Volatile across sessions.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TabHandle(pub String);

impl TabHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tab {
    pub handle: TabHandle,
    pub url: String,
    pub title: String,
    pub is_active: bool,
    /// True only in the first snapshot that observed this handle.
    pub is_new: bool,
    /// Agent-local id; assigned once per handle, never reused.
    pub stable_id: u32,
}

/// Point-in-time description of the browser. Never mutated after capture.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct BrowserState {
    /// Encoded image bytes as returned by the control surface.
    #[cfg_attr(feature = "serde-full", serde(skip))]
    pub screenshot: Vec<u8>,
    pub viewport: ViewportSize,
    pub scroll: ScrollIndicator,
    pub tabs: Vec<Tab>,
    pub active_tab: TabHandle,
    /// Browser-space pointer position.
    pub mouse: Coordinate,
}

impl BrowserState {
    pub fn tab_by_stable_id(&self, stable_id: u32) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.stable_id == stable_id)
    }

    pub fn active(&self) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.handle == self.active_tab)
    }
}

/// Closed set of actions the agent understands.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ActionKind {
    Success,
    Failure,
    Key,
    Type,
    MouseMove,
    LeftClick,
    LeftClickDrag,
    RightClick,
    MiddleClick,
    DoubleClick,
    Screenshot,
    CursorPosition,
    ScrollUp,
    ScrollDown,
    SwitchTab,
}

impl ActionKind {
    pub const ALL: [ActionKind; 15] = [
        ActionKind::Success,
        ActionKind::Failure,
        ActionKind::Key,
        ActionKind::Type,
        ActionKind::MouseMove,
        ActionKind::LeftClick,
        ActionKind::LeftClickDrag,
        ActionKind::RightClick,
        ActionKind::MiddleClick,
        ActionKind::DoubleClick,
        ActionKind::Screenshot,
        ActionKind::CursorPosition,
        ActionKind::ScrollUp,
        ActionKind::ScrollDown,
        ActionKind::SwitchTab,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Success => "success",
            ActionKind::Failure => "failure",
            ActionKind::Key => "key",
            ActionKind::Type => "type",
            ActionKind::MouseMove => "mouse_move",
            ActionKind::LeftClick => "left_click",
            ActionKind::LeftClickDrag => "left_click_drag",
            ActionKind::RightClick => "right_click",
            ActionKind::MiddleClick => "middle_click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::Screenshot => "screenshot",
            ActionKind::CursorPosition => "cursor_position",
            ActionKind::ScrollUp => "scroll_up",
            ActionKind::ScrollDown => "scroll_down",
            ActionKind::SwitchTab => "switch_tab",
        }
    }

    /// `success` and `failure` end the loop; everything else is executed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionKind::Success | ActionKind::Failure)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownActionKind(s.to_string()))
    }
}

/// Correlation id threading a planner request to its decision.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// Key tokens, typed text, failure message or (for `switch_tab`) the stable tab id.
    pub text: Option<String>,
    /// Browser-space target.
    pub coordinate: Option<Coordinate>,
    pub reasoning: String,
    pub id: ActionId,
}

impl Action {
    pub fn new(kind: ActionKind, id: ActionId) -> Self {
        Self {
            kind,
            text: None,
            coordinate: None,
            reasoning: String::new(),
            id,
        }
    }

    pub fn failure(message: impl Into<String>, id: ActionId) -> Self {
        Self::new(ActionKind::Failure, id).with_text(message)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.coordinate = Some(coordinate);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Stable tab id carried by a `switch_tab` action.
    pub fn tab_id(&self) -> Option<u32> {
        if self.kind != ActionKind::SwitchTab {
            return None;
        }
        self.text.as_deref().and_then(|t| t.trim().parse().ok())
    }
}

/// One executed, non-terminal action and the state it was taken against.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub state: BrowserState,
    pub action: Action,
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum AgentStatus {
    #[default]
    Initial,
    Running,
    Success,
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Success | AgentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Initial => "initial",
            AgentStatus::Running => "running",
            AgentStatus::Success => "success",
            AgentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>(), Ok(kind));
        }
        assert_eq!(
            "triple_click".parse::<ActionKind>(),
            Err(UnknownActionKind("triple_click".into()))
        );
    }

    #[test]
    fn only_success_and_failure_are_terminal() {
        let terminal: Vec<_> = ActionKind::ALL
            .iter()
            .filter(|kind| kind.is_terminal())
            .collect();
        assert_eq!(terminal, vec![&ActionKind::Success, &ActionKind::Failure]);
        assert!(!AgentStatus::Initial.is_terminal());
        assert!(!AgentStatus::Running.is_terminal());
        assert!(AgentStatus::Failed.is_terminal());
    }

    #[test]
    fn switch_tab_id_parsed_from_text() {
        let action = Action::new(ActionKind::SwitchTab, ActionId::new("a")).with_text(" 3 ");
        assert_eq!(action.tab_id(), Some(3));
        let typed = Action::new(ActionKind::Type, ActionId::new("b")).with_text("3");
        assert_eq!(typed.tab_id(), None);
    }

    #[test]
    fn scroll_indicator_is_clamped() {
        let scroll = ScrollIndicator::new(-0.5, 1.7);
        assert_eq!(scroll.offset, 0.0);
        assert_eq!(scroll.height, 1.0);
        assert_eq!(ScrollIndicator::new(f64::NAN, 0.5).offset, 0.0);
    }

    #[test]
    fn chebyshev_distance_uses_largest_axis() {
        let a = Coordinate::new(10, 10);
        assert_eq!(a.chebyshev_distance(&Coordinate::new(13, 4)), 6);
        assert_eq!(a.chebyshev_distance(&a), 0);
    }

    #[cfg(feature = "serde-full")]
    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AgentStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");
        let kind = serde_json::to_string(&ActionKind::LeftClickDrag).unwrap();
        assert_eq!(kind, "\"left_click_drag\"");
    }
}
