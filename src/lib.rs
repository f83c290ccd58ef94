//! # Forge Agents
//!
//! Workflow orchestration for multi-step LLM generation pipelines.
//!
//! A pipeline is a small state machine: named steps, each of which makes one
//! model call, extracts structured JSON from the free-form reply, and writes
//! it into an accumulated [`WorkflowState`]. A shared [`Router`] picks the
//! next step from the state, and any error short-circuits the run to
//! terminal. Runs never return `Err`; callers read either the output fields
//! or the `error` field of the final state.
//!
//! ## Core Concepts
//!
//! - **[`WorkflowState`]**: copy-on-write JSON object threaded through a run,
//!   with the reserved fields `next` and `error`.
//! - **[`Step`]**: object-safe, total function from state to state.
//!   [`LlmStep`] covers the common "validate inputs, call the model, extract
//!   JSON, write a field" shape; [`FnStep`] wraps a plain closure.
//! - **[`Router`]**: error first, then `next`, then the default edge.
//! - **[`StateGraph`]** / **[`CompiledGraph`]**: build, validate, then run
//!   any number of concurrent runs with a step budget and cancellation.
//! - **[`output_parser`]**: fenced / bare JSON extraction with one re-prompt
//!   ([`retry`]).
//! - **[`ExecCtx`]**: shared HTTP client, model backend, backoff, timeout,
//!   cancellation flag, and event handler.
//! - **[`PipelineRegistry`]**: name → factory lookup for the built-in
//!   [`pipelines`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use forge_agents::pipelines::{idea::IdeaRequest, PipelineRequest};
//! use forge_agents::{ExecCtx, PipelineOptions, PipelineRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = ExecCtx::builder("https://api.openai.com/v1")
//!         .openai_with_key("sk-...")
//!         .build()?;
//!
//!     let registry = PipelineRegistry::with_builtin();
//!     let graph = registry.build("idea", &PipelineOptions::default())?;
//!
//!     let state = graph
//!         .invoke(&ctx, IdeaRequest::new("developer tools").to_state()?)
//!         .await;
//!     match state.error() {
//!         Some(error) => eprintln!("run failed: {error}"),
//!         None => println!("{:#}", state.get("selected_idea").unwrap()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Custom graphs
//!
//! ```
//! use forge_agents::{ExecCtx, FnStep, MockBackend, Next, StateGraph, WorkflowState};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let graph = StateGraph::new("triage")
//!     .add_step(FnStep::new("classify", |s: &WorkflowState| {
//!         let urgent = s.get_str("ticket").is_some_and(|t| t.contains("outage"));
//!         s.with_next(if urgent { Next::step("page") } else { Next::Terminal })
//!     }))
//!     .add_step(FnStep::new("page", |s: &WorkflowState| s.with("paged", true)))
//!     .compile()
//!     .unwrap();
//!
//! let ctx = ExecCtx::builder("http://unused")
//!     .backend(Arc::new(MockBackend::fixed("")))
//!     .build()
//!     .unwrap();
//! let out = graph
//!     .invoke(&ctx, WorkflowState::new().input("ticket", "db outage"))
//!     .await;
//! assert_eq!(out.get("paged"), Some(&serde_json::json!(true)));
//! # });
//! ```

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod graph;
pub mod llm_call;
pub mod output_parser;
pub mod pipelines;
pub mod prompt;
pub mod registry;
pub mod retry;
pub mod router;
pub mod state;
pub mod step;

pub use backend::{BackoffConfig, LlmConfig, MockBackend, OpenAiBackend};
pub use checkpoint::{Checkpoint, Checkpointer, MemoryCheckpointer};
pub use config::EngineConfig;
pub use error::{FlowError, Result, StepFailure};
pub use events::{Event, EventHandler};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use graph::{CompiledGraph, RunOptions, RunOutcome, StateGraph};
pub use llm_call::StructuredCall;
pub use output_parser::{ExtractionFailure, Shape};
pub use registry::{PipelineOptions, PipelineRegistry};
pub use retry::RetryConfig;
pub use router::{Next, Router, END};
pub use state::WorkflowState;
pub use step::{BoxFut, FnStep, LlmStep, Step};
