use std::path::Path;
use std::sync::Arc;

use agent_core::planner::TokenUsage;
use agent_core::{
    ActionPlanner, AgentConfig, AgentOutcome, AnthropicTransport, BrowserAgent,
    OpenAiCompatTransport, ToolCallingPlanner,
};
use anyhow::{bail, Context, Result};
use cdp_adapter::{CdpControlSurface, ControlSurface};
use clap::Args;
use pilot_core_types::AgentStatus;
use tokio::fs;
use tracing::{debug, info};

use crate::config::{PilotConfig, PlannerBackend};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Goal for the agent, in plain language
    #[arg(short, long)]
    pub goal: String,

    /// Page to open before the first step
    #[arg(short, long)]
    pub url: Option<String>,

    /// Supporting data for the planner: literal text, or @FILE with JSON
    #[arg(long, value_name = "TEXT|@FILE")]
    pub context: Option<String>,

    /// Extra planner instruction (repeatable)
    #[arg(short, long = "instruction", value_name = "TEXT")]
    pub instructions: Vec<String>,

    /// Step budget
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Number of recent steps whose screenshots are replayed
    #[arg(long)]
    pub retention: Option<usize>,

    /// Wait for Enter after each action
    #[arg(long)]
    pub pause: bool,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Planner service to use instead of the configured one
    #[arg(long, value_enum)]
    pub backend: Option<PlannerBackend>,
}

/// The configured planner, kept concrete so token usage can be reported.
enum Planner {
    Anthropic(Arc<ToolCallingPlanner<AnthropicTransport>>),
    OpenaiCompat(Arc<ToolCallingPlanner<OpenAiCompatTransport>>),
}

impl Planner {
    fn build(config: &PilotConfig, agent: &AgentConfig) -> Result<Self> {
        Ok(match config.backend {
            PlannerBackend::Anthropic => {
                let transport = AnthropicTransport::new(config.planner.clone())
                    .context("Failed to set up the Anthropic planner")?;
                Planner::Anthropic(Arc::new(ToolCallingPlanner::new(transport, agent)))
            }
            PlannerBackend::OpenaiCompat => {
                let transport = OpenAiCompatTransport::new(config.openai_compat.clone())
                    .context("Failed to set up the chat completions planner")?;
                Planner::OpenaiCompat(Arc::new(ToolCallingPlanner::new(transport, agent)))
            }
        })
    }

    fn action_planner(&self) -> Arc<dyn ActionPlanner> {
        match self {
            Planner::Anthropic(planner) => planner.clone() as Arc<dyn ActionPlanner>,
            Planner::OpenaiCompat(planner) => planner.clone() as Arc<dyn ActionPlanner>,
        }
    }

    fn token_usage(&self) -> TokenUsage {
        match self {
            Planner::Anthropic(planner) => planner.token_usage(),
            Planner::OpenaiCompat(planner) => planner.token_usage(),
        }
    }
}

/// Folds command-line flags into the configured agent options.
pub fn apply_run_overrides(agent: &mut AgentConfig, args: &RunArgs, context: Option<String>) {
    if let Some(context) = context {
        agent.context = context;
    }
    agent.instructions.extend(args.instructions.iter().cloned());
    if let Some(max_steps) = args.max_steps {
        agent.max_steps = max_steps;
    }
    if let Some(retention) = args.retention {
        agent.screenshot_retention = retention;
    }
    if args.pause {
        agent.pause_after_each_action = true;
    }
}

/// `@path` reads a file; JSON documents are compacted, other text is kept.
pub async fn resolve_context(raw: &str) -> Result<String> {
    let Some(path) = raw.strip_prefix('@') else {
        return Ok(raw.to_string());
    };
    let content = fs::read_to_string(Path::new(path))
        .await
        .with_context(|| format!("Failed to read context file {}", path))?;
    Ok(match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(serde_json::Value::String(text)) => text,
        Ok(value) => value.to_string(),
        Err(_) => content.trim().to_string(),
    })
}

pub async fn cmd_run(args: RunArgs, mut config: PilotConfig) -> Result<()> {
    let context = match &args.context {
        Some(raw) => Some(resolve_context(raw).await?),
        None => None,
    };
    apply_run_overrides(&mut config.agent, &args, context);
    if args.headless {
        config.browser.headless = true;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    let planner = Planner::build(&config, &config.agent)?;
    let PilotConfig { agent, browser, .. } = config;

    info!(goal = %args.goal, max_steps = agent.max_steps, "starting agent");
    let surface = CdpControlSurface::connect(browser)
        .await
        .context("Failed to start browser")?;
    if let Some(url) = &args.url {
        surface
            .navigate(url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
    }

    let surface: Arc<dyn ControlSurface> = Arc::new(surface);
    let mut agent = BrowserAgent::new(surface, planner.action_planner(), args.goal.clone(), agent);
    let outcome = agent.run().await.context("Agent stopped with an error")?;

    print_summary(&outcome, planner.token_usage());
    debug!(metrics = %cdp_adapter::metrics::gather(), "cdp metrics");

    if outcome.status == AgentStatus::Failed {
        bail!(
            "goal failed: {}",
            outcome.message.as_deref().unwrap_or("no reason given")
        );
    }
    Ok(())
}

fn print_summary(outcome: &AgentOutcome, usage: TokenUsage) {
    println!("Status: {}", outcome.status);
    println!("Steps: {}", outcome.steps);
    if outcome.budget_exhausted {
        println!("Step budget exhausted before the goal was reached");
    }
    if let Some(message) = &outcome.message {
        println!("Reason: {}", message);
    }
    println!(
        "Tokens: {} in / {} out",
        usage.input_tokens, usage.output_tokens
    );
}
