//! Model-free product flow: scrape ideas, score them, then build, deploy,
//! and market the survivors.
//!
//! Every stage is simulated. Steps are wired with default edges rather than
//! `next` annotations, and each appends a timestamped entry under `logs`.
//! Validation scores are random, so two runs rarely agree; use
//! [`build_seeded`] when a reproducible run is needed.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::{
    error::Result,
    graph::{CompiledGraph, StateGraph},
    registry::PipelineOptions,
    router::END,
    state::WorkflowState,
    step::FnStep,
};

use super::finish;

pub const GRAPH_NAME: &str = "product_flow";

pub const IDEA_SCRAPER: &str = "idea_scraper";
pub const VALIDATOR: &str = "validator";
pub const MVP_BUILDER: &str = "mvp_builder";
pub const DEPLOYER: &str = "deployer";
pub const SEO_BOT: &str = "seo_bot";
pub const STEPS: [&str; 5] = [IDEA_SCRAPER, VALIDATOR, MVP_BUILDER, DEPLOYER, SEO_BOT];

pub const IDEAS: &str = "ideas";
pub const VALIDATED_IDEAS: &str = "validated_ideas";
pub const BUILT_IDEAS: &str = "built_ideas";
pub const DEPLOYED_IDEAS: &str = "deployed_ideas";
pub const MARKETED_IDEAS: &str = "marketed_ideas";
pub const LOGS: &str = "logs";

pub const REQUIRED_INPUTS: &[&str] = &[];
pub const OUTPUT_FIELDS: &[&str] = &[
    IDEAS,
    VALIDATED_IDEAS,
    BUILT_IDEAS,
    DEPLOYED_IDEAS,
    MARKETED_IDEAS,
    LOGS,
];

/// Ideas scoring above this survive validation.
pub const SCORE_THRESHOLD: u32 = 50;

const SCRAPED: &[(&str, &str)] = &[
    (
        "Build a tool that converts any website to an API",
        "https://reddit.com/r/programming/123",
    ),
    (
        "AI-powered code review assistant for small teams",
        "https://reddit.com/r/programming/456",
    ),
    (
        "Privacy-focused alternative to Google Analytics",
        "https://reddit.com/r/webdev/789",
    ),
    (
        "Open source Figma alternative with real-time collaboration",
        "https://news.ycombinator.com/item?id=123",
    ),
    (
        "Self-hosted email marketing platform for developers",
        "https://news.ycombinator.com/item?id=456",
    ),
];

/// Build the flow with an entropy-seeded scorer.
pub fn build(options: &PipelineOptions) -> Result<CompiledGraph> {
    build_with_rng(options, fastrand::Rng::new())
}

/// Build the flow with a fixed scorer seed.
pub fn build_seeded(options: &PipelineOptions, seed: u64) -> Result<CompiledGraph> {
    build_with_rng(options, fastrand::Rng::with_seed(seed))
}

fn build_with_rng(options: &PipelineOptions, rng: fastrand::Rng) -> Result<CompiledGraph> {
    let rng = Arc::new(Mutex::new(rng));

    let graph = StateGraph::new(GRAPH_NAME)
        .add_step(FnStep::new(IDEA_SCRAPER, scrape_ideas))
        .add_step(FnStep::new(VALIDATOR, move |state: &WorkflowState| {
            let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            validate_ideas(state, || rng.u32(10..=100))
        }))
        .add_step(FnStep::new(MVP_BUILDER, build_mvps))
        .add_step(FnStep::new(DEPLOYER, deploy_mvps))
        .add_step(FnStep::new(SEO_BOT, publish_seo_posts))
        .add_edge(IDEA_SCRAPER, VALIDATOR)
        .add_edge(VALIDATOR, MVP_BUILDER)
        .add_edge(MVP_BUILDER, DEPLOYER)
        .add_edge(DEPLOYER, SEO_BOT)
        .add_edge(SEO_BOT, END)
        .entry(IDEA_SCRAPER);
    finish(graph, options)
}

/// `"Some Title"` → `"some-title"`.
pub fn slug(title: &str) -> String {
    title.to_lowercase().replace(' ', "-")
}

fn items(state: &WorkflowState, field: &str) -> Vec<Map<String, Value>> {
    state
        .get(field)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|item| item.as_object().cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn title_of(idea: &Map<String, Value>) -> &str {
    idea.get("title").and_then(Value::as_str).unwrap_or_default()
}

/// Write `field` and a matching `logs.<step>` entry.
fn record(
    state: &WorkflowState,
    step: &str,
    field: &str,
    ideas: Vec<Value>,
    mut entry: Map<String, Value>,
) -> WorkflowState {
    let mut logs = state
        .get(LOGS)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    entry.insert("timestamp".into(), Utc::now().to_rfc3339().into());
    entry.insert(field.into(), Value::Array(ideas.clone()));
    logs.insert(step.into(), Value::Object(entry));

    state
        .with(field, Value::Array(ideas))
        .with(LOGS, Value::Object(logs))
}

fn count_entry(count: usize) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("count".into(), count.into());
    entry
}

fn scrape_ideas(state: &WorkflowState) -> WorkflowState {
    let ideas: Vec<Value> = SCRAPED
        .iter()
        .map(|(title, url)| json!({"title": title, "url": url}))
        .collect();
    info!(step = IDEA_SCRAPER, count = ideas.len(), "scraped ideas");
    let entry = count_entry(ideas.len());
    record(state, IDEA_SCRAPER, IDEAS, ideas, entry)
}

fn validate_ideas(state: &WorkflowState, mut score: impl FnMut() -> u32) -> WorkflowState {
    let ideas = items(state, IDEAS);
    let input_count = ideas.len();
    let validated: Vec<Value> = ideas
        .into_iter()
        .filter_map(|mut idea| {
            let value = score();
            idea.insert("score".into(), value.into());
            (value > SCORE_THRESHOLD).then_some(Value::Object(idea))
        })
        .collect();

    info!(step = VALIDATOR, input_count, kept = validated.len(), "scored ideas");
    let mut entry = Map::new();
    entry.insert("input_count".into(), input_count.into());
    entry.insert("output_count".into(), validated.len().into());
    record(state, VALIDATOR, VALIDATED_IDEAS, validated, entry)
}

fn build_mvps(state: &WorkflowState) -> WorkflowState {
    let built: Vec<Value> = items(state, VALIDATED_IDEAS)
        .into_iter()
        .map(|mut idea| {
            let title = title_of(&idea).to_string();
            info!(step = MVP_BUILDER, idea = %title, "scaffolding MVP");
            idea.insert("status".into(), "built".into());
            idea.insert(
                "repository".into(),
                format!("github.com/commandcore/{}", slug(&title)).into(),
            );
            Value::Object(idea)
        })
        .collect();
    let entry = count_entry(built.len());
    record(state, MVP_BUILDER, BUILT_IDEAS, built, entry)
}

fn deploy_mvps(state: &WorkflowState) -> WorkflowState {
    let deployed: Vec<Value> = items(state, BUILT_IDEAS)
        .into_iter()
        .map(|mut idea| {
            let title = title_of(&idea).to_string();
            info!(step = DEPLOYER, idea = %title, "deploying MVP");
            idea.insert("status".into(), "deployed".into());
            idea.insert(
                "url".into(),
                format!("https://{}.vercel.app", slug(&title)).into(),
            );
            Value::Object(idea)
        })
        .collect();
    let entry = count_entry(deployed.len());
    record(state, DEPLOYER, DEPLOYED_IDEAS, deployed, entry)
}

fn publish_seo_posts(state: &WorkflowState) -> WorkflowState {
    let marketed: Vec<Value> = items(state, DEPLOYED_IDEAS)
        .into_iter()
        .map(|mut idea| {
            let title = title_of(&idea).to_string();
            info!(step = SEO_BOT, idea = %title, "publishing SEO posts");
            idea.insert("status".into(), "marketed".into());
            idea.insert(
                "seo_posts".into(),
                json!([
                    format!("10 Ways {title} Can Revolutionize Your Workflow"),
                    format!("Why {title} is the Next Big Thing in Tech"),
                    format!("How to Get Started with {title} in 5 Minutes"),
                ]),
            );
            Value::Object(idea)
        })
        .collect();
    let entry = count_entry(marketed.len());
    record(state, SEO_BOT, MARKETED_IDEAS, marketed, entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::exec_ctx::ExecCtx;
    use crate::graph::RunOptions;

    fn ctx() -> (ExecCtx, Arc<MockBackend>) {
        let mock = Arc::new(MockBackend::fixed(""));
        let ctx = ExecCtx::builder("http://unused").backend(mock.clone()).build().unwrap();
        (ctx, mock)
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Open Source Figma"), "open-source-figma");
    }

    #[test]
    fn test_scraper_logs_count() {
        let out = scrape_ideas(&WorkflowState::new());
        let log = &out.get(LOGS).unwrap()[IDEA_SCRAPER];
        assert_eq!(log["count"], 5);
        assert_eq!(log[IDEAS].as_array().unwrap().len(), 5);
        assert!(log["timestamp"].is_string());
    }

    #[test]
    fn test_validator_keeps_scores_above_threshold() {
        let state = WorkflowState::new().input(
            IDEAS,
            json!([{"title": "A"}, {"title": "B"}, {"title": "C"}]),
        );
        let mut scores = [50, 51, 99].into_iter();
        let out = validate_ideas(&state, || scores.next().unwrap());

        let kept = out.get(VALIDATED_IDEAS).unwrap().as_array().unwrap();
        let titles: Vec<&str> = kept.iter().filter_map(|i| i["title"].as_str()).collect();
        assert_eq!(titles, ["B", "C"]);
        assert_eq!(kept[0]["score"], 51);
        let log = &out.get(LOGS).unwrap()[VALIDATOR];
        assert_eq!(log["input_count"], 3);
        assert_eq!(log["output_count"], 2);
    }

    #[test]
    fn test_later_stages_annotate_ideas() {
        let state = WorkflowState::new()
            .input(VALIDATED_IDEAS, json!([{"title": "Privacy Analytics", "score": 80}]));
        let out = publish_seo_posts(&deploy_mvps(&build_mvps(&state)));

        let idea = &out.get(MARKETED_IDEAS).unwrap()[0];
        assert_eq!(idea["status"], "marketed");
        assert_eq!(idea["repository"], "github.com/commandcore/privacy-analytics");
        assert_eq!(idea["url"], "https://privacy-analytics.vercel.app");
        assert_eq!(idea["seo_posts"].as_array().unwrap().len(), 3);
        assert_eq!(idea["score"], 80);

        let logs = out.get(LOGS).unwrap().as_object().unwrap();
        let mut steps: Vec<&str> = logs.keys().map(String::as_str).collect();
        steps.sort_unstable();
        assert_eq!(steps, [DEPLOYER, MVP_BUILDER, SEO_BOT]);
    }

    #[tokio::test]
    async fn test_full_flow_runs_every_step_without_model() {
        let (ctx, mock) = ctx();
        let graph = build(&PipelineOptions::default()).unwrap();
        let out = graph
            .invoke_traced(&ctx, WorkflowState::new(), RunOptions::default())
            .await;

        assert!(out.is_ok());
        assert_eq!(out.trace, STEPS);
        for field in OUTPUT_FIELDS {
            assert!(out.state.contains(field), "missing {field}");
        }
        let logs = out.state.get(LOGS).unwrap().as_object().unwrap();
        for step in STEPS {
            assert!(logs.contains_key(step), "no log for {step}");
        }
        assert!(out.state.next().is_none());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_seeded_flows_agree_on_survivors() {
        let (ctx, _) = ctx();
        let survivors = |state: &WorkflowState| state.get(MARKETED_IDEAS).cloned();

        let first = build_seeded(&PipelineOptions::default(), 7).unwrap();
        let second = build_seeded(&PipelineOptions::default(), 7).unwrap();
        let a = first.invoke(&ctx, WorkflowState::new()).await;
        let b = second.invoke(&ctx, WorkflowState::new()).await;
        assert_eq!(survivors(&a), survivors(&b));
    }
}
