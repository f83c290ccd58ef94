//! Example: run the idea pipeline against canned model replies.
//!
//! Run with: `cargo run --example idea_pipeline`
//! Set `RUST_LOG=forge_agents=debug` for step-level logs, and
//! `LOG_FORMAT=json` for JSON lines.

use forge_agents::pipelines::idea::{self, IdeaRequest};
use forge_agents::pipelines::PipelineRequest;
use forge_agents::{ExecCtx, MockBackend, PipelineOptions, PipelineRegistry, RunOptions};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forge_agents=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn replies() -> Vec<String> {
    let generated = json!([
        {"name": "Driftwatch", "tagline": "Catch config drift before prod does"},
        {"name": "Shiplog", "tagline": "Changelogs written from merged PRs"}
    ]);
    let validated = json!([
        {
            "name": "Driftwatch",
            "tagline": "Catch config drift before prod does",
            "description": "Diffs live infrastructure against IaC on every deploy.",
            "target_audience": ["Platform teams"],
            "validation_score": 82,
            "time_to_mvp": "6 weeks"
        },
        {
            "name": "Shiplog",
            "tagline": "Changelogs written from merged PRs",
            "description": "Groups merged PRs into release notes per audience.",
            "target_audience": ["Open-source maintainers"],
            "validation_score": 71,
            "time_to_mvp": "3 weeks"
        }
    ]);
    let selected = json!({
        "name": "Driftwatch",
        "validation_score": 82,
        "selection_reasoning": "Highest score and a clear buyer."
    });

    [generated, validated, selected]
        .iter()
        .map(|v| format!("Here is the result:\n```json\n{v:#}\n```"))
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mock = Arc::new(MockBackend::new(replies()));
    let ctx = ExecCtx::builder("http://unused").backend(mock.clone()).build()?;

    let registry = PipelineRegistry::with_builtin();
    println!("Registered pipelines: {}", registry.list().join(", "));

    let graph = registry.build(idea::GRAPH_NAME, &PipelineOptions::default())?;
    let request = IdeaRequest::new("developer tools").with_trends(["Platform engineering"]);

    let outcome = graph
        .invoke_traced(&ctx, request.to_state()?, RunOptions::with_run_id("demo"))
        .await;

    println!("Steps: {}", outcome.trace.join(" -> "));
    println!("Model calls: {}", mock.calls());
    match outcome.error() {
        Some(error) => println!("Run failed: {error}"),
        None => match idea::selected_idea(&outcome.state) {
            Some(selected) => println!("Selected: {} (score {})", selected.name, selected.validation_score),
            None => println!("No idea selected"),
        },
    }

    Ok(())
}
