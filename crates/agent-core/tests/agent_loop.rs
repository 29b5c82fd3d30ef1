mod common;

use std::sync::Arc;

use agent_core::planner::{ScriptedTransport, ToolCallingPlanner};
use agent_core::{
    ActionPlanner, AgentConfig, AgentError, BrowserAgent, SequentialIdSource,
};
use common::{computer, reply, tool, FakeBrowser};
use pilot_core_types::{ActionKind, AgentStatus};
use serde_json::json;

type Planner = ToolCallingPlanner<ScriptedTransport>;

fn planner(config: &AgentConfig, replies: Vec<agent_core::planner::PlannerReply>) -> Arc<Planner> {
    Arc::new(
        ToolCallingPlanner::new(ScriptedTransport::with_replies(replies), config)
            .with_ids(Arc::new(SequentialIdSource::new("gen-"))),
    )
}

fn agent(browser: &Arc<FakeBrowser>, planner: &Arc<Planner>, config: AgentConfig) -> BrowserAgent {
    let planner: Arc<dyn ActionPlanner> = planner.clone();
    BrowserAgent::new(browser.clone(), planner, "Find the pricing page", config)
}

fn far_move(id: &str) -> agent_core::planner::PlannerReply {
    reply(vec![
        agent_core::planner::ContentBlock::text("Moving to the menu."),
        computer(id, json!({ "action": "mouse_move", "coordinate": [600, 400] })),
    ])
}

#[tokio::test]
async fn stops_when_step_budget_is_spent() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal().max_steps(3);
    let planner = planner(
        &config,
        (0..5).map(|i| far_move(&format!("toolu_{i}"))).collect(),
    );
    let mut agent = agent(&browser, &planner, config);

    let outcome = agent.run().await.unwrap();

    assert_eq!(outcome.status, AgentStatus::Running);
    assert_eq!(outcome.steps, 3);
    assert!(outcome.budget_exhausted);
    assert_eq!(agent.history().len(), 3);
    assert_eq!(planner.transport().calls().len(), 3);
    assert_eq!(planner.transport().remaining(), 2);
}

#[tokio::test]
async fn zero_budget_never_consults_the_planner() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal().max_steps(0);
    let planner = planner(&config, vec![far_move("toolu_0")]);
    let mut agent = agent(&browser, &planner, config);

    let outcome = agent.run().await.unwrap();

    assert!(outcome.budget_exhausted);
    assert_eq!(outcome.steps, 0);
    assert!(planner.transport().calls().is_empty());
}

#[tokio::test]
async fn success_is_final() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal();
    let planner = planner(
        &config,
        vec![
            reply(vec![computer("toolu_a", json!({ "action": "left_click" }))]),
            reply(vec![tool("toolu_b", "stop_browsing", json!({ "success": true }))]),
            far_move("toolu_c"),
        ],
    );
    let mut agent = agent(&browser, &planner, config);

    let outcome = agent.run().await.unwrap();
    assert_eq!(outcome.status, AgentStatus::Success);
    assert_eq!(outcome.steps, 1);
    assert!(!outcome.budget_exhausted);
    assert_eq!(browser.actions(), vec!["click:left".to_string()]);

    assert_eq!(agent.step().await.unwrap(), AgentStatus::Success);
    assert_eq!(agent.history().len(), 1);
    assert_eq!(planner.transport().calls().len(), 2);
}

#[tokio::test]
async fn failure_carries_the_reason() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal();
    let planner = planner(
        &config,
        vec![reply(vec![tool(
            "toolu_a",
            "stop_browsing",
            json!({ "success": false, "error": "Login required" }),
        )])],
    );
    let mut agent = agent(&browser, &planner, config);

    let outcome = agent.run().await.unwrap();

    assert_eq!(outcome.status, AgentStatus::Failed);
    assert_eq!(outcome.message.as_deref(), Some("Login required"));
    assert!(agent.history().is_empty());
    assert!(browser.actions().is_empty());
}

#[tokio::test]
async fn invalid_decision_fails_without_executing() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal();
    let planner = planner(
        &config,
        vec![reply(vec![computer("toolu_a", json!({ "action": "type" }))])],
    );
    let mut agent = agent(&browser, &planner, config);

    let outcome = agent.run().await.unwrap();

    assert_eq!(outcome.status, AgentStatus::Failed);
    assert_eq!(outcome.message.as_deref(), Some("No text provided for type"));
    assert!(browser.actions().is_empty());
}

#[tokio::test]
async fn reply_without_tool_call_fails() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal();
    let planner = planner(
        &config,
        vec![reply(vec![agent_core::planner::ContentBlock::text("All done here.")])],
    );
    let mut agent = agent(&browser, &planner, config);

    let outcome = agent.run().await.unwrap();

    assert_eq!(outcome.status, AgentStatus::Failed);
    let decision = agent.last_decision().unwrap();
    assert!(decision.id.as_str().starts_with("gen-"));
    assert_eq!(decision.reasoning, "All done here.");
}

#[tokio::test]
async fn small_mouse_move_clicks_instead() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal().max_steps(1);
    let planner = planner(
        &config,
        vec![reply(vec![computer(
            "toolu_a",
            json!({ "action": "mouse_move", "coordinate": [3, 3] }),
        )])],
    );
    let mut agent = agent(&browser, &planner, config);

    agent.run().await.unwrap();

    // bootstrap nudge leaves the pointer at (1, 1)
    assert_eq!(agent.history()[0].state.mouse, pilot_core_types::Coordinate::new(1, 1));
    assert_eq!(agent.history()[0].action.kind, ActionKind::LeftClick);
    assert_eq!(browser.actions(), vec!["click:left".to_string()]);
}

#[tokio::test]
async fn actions_are_executed_in_browser_space() {
    let browser = Arc::new(FakeBrowser::new(1920, 1080));
    let config = AgentConfig::minimal().max_steps(4);
    let planner = planner(
        &config,
        vec![
            reply(vec![computer(
                "toolu_a",
                json!({ "action": "mouse_move", "coordinate": [640, 400] }),
            )]),
            reply(vec![computer("toolu_b", json!({ "action": "key", "text": "Page_Down" }))]),
            reply(vec![computer("toolu_c", json!({ "action": "type", "text": "hello world" }))]),
            reply(vec![computer("toolu_d", json!({ "action": "key", "text": "ctrl+a Return" }))]),
        ],
    );
    let mut agent = agent(&browser, &planner, config);

    agent.run().await.unwrap();

    assert_eq!(
        browser.actions(),
        vec![
            "move:960,600".to_string(),
            "scroll:810".to_string(),
            "keys:hello world".to_string(),
            "keys:Control+a Enter".to_string(),
        ]
    );
    let kinds: Vec<ActionKind> = agent.history().iter().map(|s| s.action.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActionKind::MouseMove,
            ActionKind::ScrollDown,
            ActionKind::Type,
            ActionKind::Key
        ]
    );
}

#[tokio::test]
async fn switch_tab_uses_stable_ids() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    browser.open_tab("B", "https://example.com/docs", "Docs");
    let config = AgentConfig::minimal().max_steps(3);
    let planner = planner(
        &config,
        vec![
            reply(vec![tool("toolu_a", "switch_tab", json!({ "tab_id": 1 }))]),
            reply(vec![tool("toolu_b", "switch_tab", json!({ "tab_id": 9 }))]),
        ],
    );
    let mut agent = agent(&browser, &planner, config);

    let outcome = agent.run().await.unwrap();

    assert_eq!(browser.active_handle().as_str(), "B");
    assert_eq!(agent.history()[0].action.kind, ActionKind::SwitchTab);
    assert_eq!(outcome.status, AgentStatus::Failed);
    assert_eq!(outcome.message.as_deref(), Some("No open tab with id 9"));
}

#[tokio::test]
async fn surface_errors_propagate() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    browser.fail_on("click:");
    let config = AgentConfig::minimal();
    let planner = planner(
        &config,
        vec![reply(vec![computer("toolu_a", json!({ "action": "left_click" }))])],
    );
    let mut agent = agent(&browser, &planner, config);

    let err = agent.run().await.unwrap_err();

    assert!(matches!(err, AgentError::Surface(_)));
    assert!(agent.history().is_empty());
    assert_eq!(agent.status(), AgentStatus::Running);
}

#[tokio::test]
async fn empty_goal_is_rejected() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal();
    let planner: Arc<dyn ActionPlanner> = planner(&config, Vec::new());
    let mut agent = BrowserAgent::new(browser.clone(), planner, "   ", config);

    let err = agent.run().await.unwrap_err();

    assert!(matches!(err, AgentError::InvalidRequest(_)));
    assert!(browser.calls().is_empty());
}

#[tokio::test]
async fn planner_sees_the_retained_screenshots() {
    let browser = Arc::new(FakeBrowser::new(1280, 800));
    let config = AgentConfig::minimal().max_steps(3).retention(1);
    let planner = planner(
        &config,
        (0..3).map(|i| far_move(&format!("toolu_{i}"))).collect(),
    );
    let mut agent = agent(&browser, &planner, config);

    agent.run().await.unwrap();

    let calls = planner.transport().calls();
    let images: Vec<usize> = calls
        .iter()
        .map(|call| call.messages.iter().map(|m| m.images().count()).sum())
        .collect();
    // current state always, plus the newest step once history exists
    assert_eq!(images, vec![1, 2, 2]);
    assert_eq!(calls[2].display.width, 1280);
    assert!(calls[0].system.contains("<SYSTEM_CAPABILITY>"));
}
