use std::fs;

use agent_core::AgentConfig;
use clap::Parser;
use pilot_cli::cli::commands::Commands;
use pilot_cli::cli::env::{CliArgs, LogFormat};
use pilot_cli::cli::run::{apply_run_overrides, resolve_context, RunArgs};
use pilot_cli::config::PlannerBackend;
use tempfile::TempDir;

fn run_args(argv: &[&str]) -> RunArgs {
    let mut full = vec!["pilot", "run"];
    full.extend_from_slice(argv);
    match CliArgs::try_parse_from(full).unwrap().command {
        Commands::Run(args) => args,
        other => panic!("expected run, got {:?}", other),
    }
}

#[test]
fn global_flags_parse() {
    let cli = CliArgs::try_parse_from([
        "pilot",
        "--log-format",
        "json",
        "-d",
        "config",
        "path",
    ])
    .unwrap();
    assert!(cli.debug);
    assert_eq!(cli.log_format, LogFormat::Json);
    assert_eq!(cli.log_level, "info");
    assert!(matches!(cli.command, Commands::Config(_)));
}

#[test]
fn run_requires_a_goal() {
    assert!(CliArgs::try_parse_from(["pilot", "run"]).is_err());
}

#[test]
fn run_flags_override_the_agent_config() {
    let args = run_args(&[
        "--goal",
        "Find the cheapest flight",
        "-i",
        "Prefer direct flights",
        "-i",
        "Stay on the first page",
        "--max-steps",
        "4",
        "--retention",
        "2",
        "--pause",
    ]);
    assert_eq!(args.goal, "Find the cheapest flight");

    let mut agent = AgentConfig::default().instruction("Be brief");
    apply_run_overrides(&mut agent, &args, Some("{\"from\":\"SFO\"}".into()));

    assert_eq!(agent.max_steps, 4);
    assert_eq!(agent.screenshot_retention, 2);
    assert!(agent.pause_after_each_action);
    assert_eq!(agent.context, "{\"from\":\"SFO\"}");
    assert_eq!(
        agent.instructions,
        vec!["Be brief", "Prefer direct flights", "Stay on the first page"]
    );
}

#[test]
fn backend_flag_selects_the_planner_service() {
    let args = run_args(&["--goal", "x", "--backend", "openai-compat"]);
    assert_eq!(args.backend, Some(PlannerBackend::OpenaiCompat));

    let args = run_args(&["--goal", "x"]);
    assert_eq!(args.backend, None);

    assert!(
        CliArgs::try_parse_from(["pilot", "run", "--goal", "x", "--backend", "gemini"]).is_err()
    );
}

#[test]
fn absent_flags_leave_the_config_alone() {
    let args = run_args(&["--goal", "x"]);
    let mut agent = AgentConfig::default();
    apply_run_overrides(&mut agent, &args, None);
    assert_eq!(agent, AgentConfig::default());
}

#[tokio::test]
async fn literal_context_is_kept() {
    assert_eq!(resolve_context("budget under 300").await.unwrap(), "budget under 300");
}

#[tokio::test]
async fn context_file_is_compacted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ctx.json");
    fs::write(&path, "{\n  \"city\": \"Lisbon\",\n  \"nights\": 3\n}\n").unwrap();

    let context = resolve_context(&format!("@{}", path.display())).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&context).unwrap();
    assert_eq!(value["city"], "Lisbon");
    assert_eq!(value["nights"], 3);
    assert!(!context.contains('\n'));
}

#[tokio::test]
async fn plain_text_context_file_is_trimmed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ctx.txt");
    fs::write(&path, "  window seat please\n").unwrap();

    let context = resolve_context(&format!("@{}", path.display())).await.unwrap();
    assert_eq!(context, "window seat please");
}

#[tokio::test]
async fn missing_context_file_is_an_error() {
    assert!(resolve_context("@/nonexistent/ctx.json").await.is_err());
}
