//! Agent loop controller.
//!
//! Owns the browser session, the planner, the step history and the tab
//! registry for one goal attempt. Steps run strictly one after another.

use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::ControlSurface;
use pilot_core_types::{Action, ActionKind, AgentStatus, BrowserState, Coordinate, Step};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use super::config::AgentConfig;
use super::executor::execute_action;
use super::snapshot::{SnapshotBuilder, TabRegistry};
use crate::errors::{AgentError, DecisionError};
use crate::planner::{ActionPlanner, PlanRequest};

/// How a [`BrowserAgent::run`] call ended.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub status: AgentStatus,
    /// Executed non-terminal actions.
    pub steps: usize,
    /// The step budget ran out before the planner finished.
    pub budget_exhausted: bool,
    /// Failure text when the status is `failed`.
    pub message: Option<String>,
}

pub struct BrowserAgent {
    surface: Arc<dyn ControlSurface>,
    planner: Arc<dyn ActionPlanner>,
    config: AgentConfig,
    goal: String,
    status: AgentStatus,
    history: Vec<Step>,
    registry: TabRegistry,
    snapshots: SnapshotBuilder,
    last_decision: Option<Action>,
}

impl BrowserAgent {
    pub fn new(
        surface: Arc<dyn ControlSurface>,
        planner: Arc<dyn ActionPlanner>,
        goal: impl Into<String>,
        config: AgentConfig,
    ) -> Self {
        let snapshots = SnapshotBuilder::new(Duration::from_millis(config.mouse_probe_settle_ms));
        Self {
            surface,
            planner,
            config,
            goal: goal.into(),
            status: AgentStatus::Initial,
            history: Vec::new(),
            registry: TabRegistry::new(),
            snapshots,
            last_decision: None,
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn history(&self) -> &[Step] {
        &self.history
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The most recent normalized planner decision, terminal ones included.
    pub fn last_decision(&self) -> Option<&Action> {
        self.last_decision.as_ref()
    }

    /// Runs until the planner finishes or the step budget is spent.
    pub async fn run(&mut self) -> Result<AgentOutcome, AgentError> {
        if self.goal.trim().is_empty() {
            return Err(AgentError::invalid_request("goal must not be empty"));
        }

        if self.status == AgentStatus::Initial {
            // Puts the pointer inside the viewport so the first probe sees it.
            self.surface.move_mouse_by(1, 1).await?;
        }

        while !self.status.is_terminal() && self.history.len() < self.config.max_steps {
            self.step().await?;
        }

        let outcome = self.outcome();
        if outcome.budget_exhausted {
            warn!(
                steps = outcome.steps,
                max_steps = self.config.max_steps,
                "step budget exhausted"
            );
        } else {
            info!(status = %outcome.status, steps = outcome.steps, "agent finished");
        }
        Ok(outcome)
    }

    /// Performs one observe-plan-act cycle and returns the resulting status.
    /// Once the status is terminal this is a no-op.
    pub async fn step(&mut self) -> Result<AgentStatus, AgentError> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }
        let index = self.history.len() + 1;

        let state = self
            .snapshots
            .capture(self.surface.as_ref(), &mut self.registry)
            .await?;

        let proposed = self
            .planner
            .plan_action(PlanRequest {
                goal: &self.goal,
                context: &self.config.context,
                instructions: &self.config.instructions,
                state: &state,
                history: &self.history,
            })
            .await?;
        let action = vet_action(proposed, &state);
        self.last_decision = Some(action.clone());

        match action.kind {
            ActionKind::Success => {
                info!(step = index, reasoning = %action.reasoning, "planner reported success");
                self.status = AgentStatus::Success;
            }
            ActionKind::Failure => {
                warn!(
                    step = index,
                    reason = action.text.as_deref().unwrap_or_default(),
                    "planner reported failure"
                );
                self.status = AgentStatus::Failed;
            }
            _ => {
                self.status = AgentStatus::Running;
                info!(
                    step = index,
                    action = %action.kind,
                    text = action.text.as_deref().unwrap_or_default(),
                    coordinate = ?action.coordinate,
                    "executing step"
                );
                execute_action(self.surface.as_ref(), &action, &state, &self.registry).await?;
                self.history.push(Step { state, action });
                self.pace().await?;
            }
        }

        Ok(self.status)
    }

    fn outcome(&self) -> AgentOutcome {
        let message = match (self.status, &self.last_decision) {
            (AgentStatus::Failed, Some(action)) => action.text.clone(),
            _ => None,
        };
        AgentOutcome {
            status: self.status,
            steps: self.history.len(),
            budget_exhausted: !self.status.is_terminal(),
            message,
        }
    }

    async fn pace(&self) -> Result<(), AgentError> {
        if self.config.step_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
        }
        if self.config.pause_after_each_action {
            wait_for_enter().await?;
        }
        Ok(())
    }
}

async fn wait_for_enter() -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Press Enter to continue...").await?;
    stdout.flush().await?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(())
}

/// Last line of defence for planner output: rejects actions that cannot be
/// executed against `state` and clamps coordinates into the viewport.
fn vet_action(action: Action, state: &BrowserState) -> Action {
    let problem = match action.kind {
        ActionKind::Key | ActionKind::Type
            if action.text.as_deref().map_or(true, str::is_empty) =>
        {
            Some(DecisionError::MissingText(action.kind.to_string()))
        }
        ActionKind::MouseMove | ActionKind::LeftClickDrag if action.coordinate.is_none() => {
            Some(DecisionError::MissingCoordinate(action.kind.to_string()))
        }
        ActionKind::SwitchTab => match action.tab_id() {
            None => Some(DecisionError::InvalidTabId),
            Some(id) if state.tab_by_stable_id(id).is_none() => {
                Some(DecisionError::UnresolvedTab(id))
            }
            Some(_) => None,
        },
        _ => None,
    };

    if let Some(problem) = problem {
        return Action::failure(problem.to_string(), action.id).with_reasoning(action.reasoning);
    }

    match action.coordinate {
        Some(point) => {
            let clamped = Coordinate::new(
                point.x.min(state.viewport.width),
                point.y.min(state.viewport.height),
            );
            Action {
                coordinate: Some(clamped),
                ..action
            }
        }
        None => action,
    }
}
