//! Concrete pipelines built on the engine.
//!
//! Each submodule exports its graph name, step names, required inputs and
//! output fields as constants, a typed request that becomes the initial
//! state, and a `build` factory suitable for the
//! [`PipelineRegistry`](crate::registry::PipelineRegistry).
//!
//! | pipeline       | steps                                                     |
//! |----------------|-----------------------------------------------------------|
//! | `idea`         | generate → validate → select                              |
//! | `product`      | specification → architecture → code structure             |
//! | `deployment`   | plan → config → execution report                          |
//! | `marketing`    | strategy → SEO → social media → copy                      |
//! | `product_flow` | scrape → validate → build → deploy → SEO (no model calls) |

pub mod deployment;
pub mod idea;
pub mod marketing;
pub mod product;
pub mod product_flow;

use crate::{
    error::Result,
    graph::{CompiledGraph, StateGraph},
    registry::PipelineOptions,
    state::WorkflowState,
    step::LlmStep,
};
use serde::Serialize;

/// Typed inputs of a pipeline.
pub trait PipelineRequest: Serialize {
    /// The initial state for a run.
    fn to_state(&self) -> Result<WorkflowState> {
        WorkflowState::from_view(self)
    }
}

/// An [`LlmStep`] using the configured model, at `temperature` unless the
/// options override it.
pub(crate) fn llm_step(
    options: &PipelineOptions,
    name: &str,
    system_template: &str,
    human_message: &str,
    temperature: f64,
) -> LlmStep {
    LlmStep::new(name, system_template, human_message)
        .with_model(options.model.clone())
        .with_temperature(options.temperature_or(temperature))
}

/// Apply the run-wide options and compile.
pub(crate) fn finish(mut graph: StateGraph, options: &PipelineOptions) -> Result<CompiledGraph> {
    if let Some(limit) = options.max_steps {
        graph = graph.max_steps(limit);
    }
    if let Some(checkpointer) = &options.checkpointer {
        graph = graph.checkpointer(checkpointer.clone());
    }
    graph.compile()
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::backend::MockBackend;
    use crate::exec_ctx::ExecCtx;
    use serde_json::Value;
    use std::sync::Arc;

    /// Wrap `value` the way chat models usually answer.
    pub fn fenced(value: &Value) -> String {
        format!("Here you go:\n```json\n{value}\n```")
    }

    /// Replies served in order, cycling when exhausted.
    pub fn scripted(replies: Vec<String>) -> Arc<MockBackend> {
        Arc::new(MockBackend::new(replies))
    }

    pub fn ctx(mock: Arc<MockBackend>) -> ExecCtx {
        ExecCtx::builder("http://unused").backend(mock).build().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Ticket {
        title: String,
        labels: Vec<String>,
    }

    impl PipelineRequest for Ticket {}

    fn initial_state<R: PipelineRequest>(request: &R) -> Result<WorkflowState> {
        request.to_state()
    }

    #[test]
    fn test_default_to_state_serializes_request() {
        let ticket = Ticket {
            title: "db outage".into(),
            labels: vec!["p1".into()],
        };
        let state = initial_state(&ticket).unwrap();
        assert_eq!(state.get_str("title"), Some("db outage"));
        assert_eq!(state.get("labels"), Some(&json!(["p1"])));
        assert!(state.next().is_none());
    }
}
