mod common;

use agent_core::planner::conversation::{ContentBlock, PlannerMessage, Role};
use agent_core::planner::{HistorySerializer, SerializerSettings};
use agent_core::ActionNormalizer;
use agent_core::{PlannerCanvas, Scaling, SequentialIdSource};
use common::png;
use pilot_core_types::{
    Action, ActionId, ActionKind, BrowserState, Coordinate, ScrollIndicator, Step, Tab, TabHandle,
    ViewportSize,
};
use serde_json::json;

fn state(mouse: Coordinate) -> BrowserState {
    BrowserState {
        screenshot: png(1920, 1080),
        viewport: ViewportSize::new(1920, 1080),
        scroll: ScrollIndicator::new(0.25, 0.5),
        tabs: vec![Tab {
            handle: TabHandle::new("A"),
            url: "https://example.com/".into(),
            title: "Example".into(),
            is_active: true,
            is_new: false,
            stable_id: 0,
        }],
        active_tab: TabHandle::new("A"),
        mouse,
    }
}

fn history(len: usize) -> Vec<Step> {
    (0..len)
        .map(|i| Step {
            state: state(Coordinate::new(30 * i as u32, 30 * i as u32)),
            action: Action::new(ActionKind::ScrollDown, ActionId::new(format!("toolu_{i}")))
                .with_reasoning(format!("step {}", i + 1)),
        })
        .collect()
}

fn serialize(history: &[Step], current: &BrowserState, retention: usize) -> Vec<PlannerMessage> {
    let settings = SerializerSettings {
        retention,
        ..SerializerSettings::default()
    };
    HistorySerializer::new(
        "Buy milk",
        "None",
        current,
        history,
        &settings,
        ActionId::new("toolu_boot"),
    )
    .collect::<Result<Vec<_>, _>>()
    .unwrap()
}

fn tool_result(message: &PlannerMessage) -> (&str, &[ContentBlock]) {
    match &message.content[..] {
        [ContentBlock::ToolResult {
            tool_use_id,
            content,
        }] => (tool_use_id.as_str(), content.as_slice()),
        other => panic!("expected a single tool result, got {:?}", other),
    }
}

#[test]
fn retention_window_limits_screenshots() {
    let steps = history(5);
    let current = state(Coordinate::new(960, 540));
    let messages = serialize(&steps, &current, 2);

    // instruction, bootstrap, (outcome, decision) x 5, final
    assert_eq!(messages.len(), 13);

    let outcomes: Vec<usize> = (0..5)
        .map(|i| messages[2 + 2 * i].images().count())
        .collect();
    assert_eq!(outcomes, vec![0, 0, 0, 1, 1]);
    assert_eq!(messages[12].images().count(), 1);
}

#[test]
fn unbounded_retention_keeps_every_screenshot() {
    let steps = history(3);
    let current = state(Coordinate::new(960, 540));
    let messages = serialize(&steps, &current, usize::MAX);

    let outcomes: Vec<usize> = (0..3)
        .map(|i| messages[2 + 2 * i].images().count())
        .collect();
    assert_eq!(outcomes, vec![1, 1, 1]);
}

#[test]
fn zero_retention_keeps_only_the_current_screenshot() {
    let steps = history(2);
    let current = state(Coordinate::new(960, 540));
    let messages = serialize(&steps, &current, 0);

    assert_eq!(messages[2].images().count(), 0);
    assert_eq!(messages[4].images().count(), 0);
    assert_eq!(messages[6].images().count(), 1);
}

#[test]
fn roles_alternate_and_results_answer_the_previous_call() {
    let steps = history(3);
    let current = state(Coordinate::new(960, 540));
    let messages = serialize(&steps, &current, 1);

    for (i, message) in messages.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(message.role, expected, "message {}", i);
    }

    let ids: Vec<&str> = [2, 4, 6, 8]
        .iter()
        .map(|i| tool_result(&messages[*i]).0)
        .collect();
    assert_eq!(ids, vec!["toolu_boot", "toolu_0", "toolu_1", "toolu_2"]);
}

#[test]
fn instruction_and_final_state_are_complete() {
    let current = state(Coordinate::new(960, 540));
    let messages = serialize(&[], &current, 1);
    assert_eq!(messages.len(), 3);

    match &messages[0].content[0] {
        ContentBlock::Text { text } => {
            assert!(text.contains("<USER_TASK>\nBuy milk\n</USER_TASK>"));
            assert!(text.contains("<USER_DATA>\nNone\n</USER_DATA>"));
        }
        other => panic!("unexpected block {:?}", other),
    }

    let (id, content) = tool_result(&messages[2]);
    assert_eq!(id, "toolu_boot");
    let ContentBlock::Text { text } = &content[0] else {
        panic!("summary must come first");
    };
    assert!(text.contains("After action mouse cursor is at X: 640, Y: 360"));
    assert!(text.contains(r#""tab_id":0"#));
    assert!(matches!(content[1], ContentBlock::Image { .. }));
}

#[test]
fn decisions_replay_the_executed_action() {
    let mut steps = history(1);
    steps[0].action = Action::new(ActionKind::LeftClick, ActionId::new("toolu_0"))
        .with_reasoning("Click the cart.");
    let current = state(Coordinate::new(960, 540));
    let messages = serialize(&steps, &current, 1);

    let decision = &messages[3];
    assert_eq!(decision.role, Role::Assistant);
    assert_eq!(decision.content[0], ContentBlock::text("Click the cart."));
    match &decision.content[1] {
        ContentBlock::ToolUse { id, name, input } => {
            assert_eq!(id, "toolu_0");
            assert_eq!(name, "computer");
            assert_eq!(input, &json!({ "action": "left_click" }));
        }
        other => panic!("unexpected block {:?}", other),
    }
}

#[test]
fn serialization_is_repeatable() {
    let steps = history(2);
    let current = state(Coordinate::new(10, 10));
    assert_eq!(serialize(&steps, &current, 1), serialize(&steps, &current, 1));
}

#[test]
fn normalized_page_down_replays_as_key() {
    let current = state(Coordinate::new(10, 10));
    let scaling = Scaling::fit(current.viewport, PlannerCanvas::default());
    let action = ActionNormalizer::default().normalize(
        &[ContentBlock::ToolUse {
            id: "toolu_0".into(),
            name: "computer".into(),
            input: json!({ "action": "key", "text": "Page_Down" }),
        }],
        &scaling,
        &current,
        &SequentialIdSource::new("x"),
    );
    assert_eq!(action.kind, ActionKind::ScrollDown);

    let steps = vec![Step {
        state: current.clone(),
        action,
    }];
    let messages = serialize(&steps, &current, 1);
    match &messages[3].content[..] {
        [ContentBlock::ToolUse { input, .. }] => {
            assert_eq!(input, &json!({ "action": "key", "text": "Page_Down" }));
        }
        other => panic!("unexpected blocks {:?}", other),
    }
}
