//! Graph construction and the run loop.
//!
//! [`StateGraph`] collects steps, default edges, and an entry point, and
//! [`compile`](StateGraph::compile)s them into an immutable [`CompiledGraph`].
//! A compiled graph is `Send + Sync` and can serve any number of concurrent
//! runs; each run owns its own [`WorkflowState`].
//!
//! The loop: run the current step, ask the [`Router`] for the next one,
//! repeat until the router answers [`Next::Terminal`]. Before each step the
//! loop also stops for a pre-existing error, an exhausted step budget, or a
//! cancellation request.

use crate::{
    checkpoint::{Checkpoint, Checkpointer},
    error::{FlowError, Result, StepFailure},
    events::{emit, Event},
    exec_ctx::ExecCtx,
    router::{Next, Router, END},
    state::WorkflowState,
    step::Step,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Step budget when none is configured.
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Mutable graph builder.
///
/// # Example
///
/// ```
/// use forge_agents::{FnStep, StateGraph, WorkflowState};
///
/// let graph = StateGraph::new("greeting")
///     .add_step(FnStep::new("hello", |s: &WorkflowState| s.with("greeting", "hello")))
///     .add_step(FnStep::new("world", |s: &WorkflowState| s.with("target", "world")))
///     .add_edge("hello", "world")
///     .entry("hello")
///     .compile()
///     .unwrap();
///
/// assert_eq!(graph.step_names(), ["hello", "world"]);
/// ```
pub struct StateGraph {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    edges: Vec<(String, String)>,
    entry: Option<String>,
    max_steps: usize,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl StateGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            edges: Vec::new(),
            entry: None,
            max_steps: DEFAULT_MAX_STEPS,
            checkpointer: None,
        }
    }

    pub fn add_step(self, step: impl Step + 'static) -> Self {
        self.add_shared_step(Arc::new(step))
    }

    pub fn add_shared_step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Default successor of `from`, used when a step leaves `next` unset.
    /// `to` may be [`END`].
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// First step of every run. Defaults to the first step added.
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn max_steps(mut self, limit: usize) -> Self {
        self.max_steps = limit;
        self
    }

    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Fails on: no steps, duplicate or reserved step names, an unknown
    /// entry, edges touching unknown steps, two edges from the same step,
    /// or a zero step budget.
    pub fn compile(self) -> Result<CompiledGraph> {
        let invalid = |msg: String| Err(FlowError::InvalidConfig(format!("graph '{}': {msg}", self.name)));

        if self.steps.is_empty() {
            return invalid("no steps".into());
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be at least 1".into());
        }

        let mut order = Vec::with_capacity(self.steps.len());
        let mut steps = HashMap::with_capacity(self.steps.len());
        for step in &self.steps {
            let name = step.name().to_string();
            if name.is_empty() || name == END {
                return invalid(format!("'{name}' is not a valid step name"));
            }
            if steps.insert(name.clone(), step.clone()).is_some() {
                return invalid(format!("duplicate step '{name}'"));
            }
            order.push(name);
        }

        let entry = match &self.entry {
            Some(entry) => entry.clone(),
            None => order[0].clone(),
        };
        if !steps.contains_key(&entry) {
            return invalid(format!("entry step '{entry}' is not registered"));
        }

        let mut edges = HashMap::new();
        for (from, to) in &self.edges {
            if !steps.contains_key(from) {
                return invalid(format!("edge from unknown step '{from}'"));
            }
            if to != END && !steps.contains_key(to) {
                return invalid(format!("edge from '{from}' to unknown step '{to}'"));
            }
            if edges.insert(from.clone(), to.clone()).is_some() {
                return invalid(format!("step '{from}' has more than one default edge"));
            }
        }

        let known: HashSet<String> = order.iter().cloned().collect();
        Ok(CompiledGraph {
            router: Router::new(known, edges),
            name: self.name,
            steps,
            order,
            entry,
            max_steps: self.max_steps,
            checkpointer: self.checkpointer,
        })
    }
}

/// Per-run options for [`CompiledGraph::invoke_traced`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Caller-chosen run id. A random UUID is used when `None`.
    pub run_id: Option<String>,
}

impl RunOptions {
    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
        }
    }
}

/// Final state of a run plus what it executed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    pub state: WorkflowState,
    /// Names of the executed steps, in order.
    pub trace: Vec<String>,
}

impl RunOutcome {
    pub fn error(&self) -> Option<&str> {
        self.state.error()
    }

    pub fn is_ok(&self) -> bool {
        !self.state.has_error()
    }
}

/// An immutable, runnable graph.
pub struct CompiledGraph {
    name: String,
    steps: HashMap<String, Arc<dyn Step>>,
    order: Vec<String>,
    entry: String,
    router: Router,
    max_steps: usize,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("steps", &self.order)
            .field("entry", &self.entry)
            .field("max_steps", &self.max_steps)
            .field("has_checkpointer", &self.checkpointer.is_some())
            .finish()
    }
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Step names in registration order.
    pub fn step_names(&self) -> &[String] {
        &self.order
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run to completion and return the final state.
    ///
    /// Never fails: any failure is reported in the returned state's `error`
    /// field.
    pub async fn invoke(&self, ctx: &ExecCtx, initial: WorkflowState) -> WorkflowState {
        self.invoke_traced(ctx, initial, RunOptions::default())
            .await
            .state
    }

    /// Run to completion and return the final state with the run id and the
    /// executed step sequence.
    pub async fn invoke_traced(
        &self,
        ctx: &ExecCtx,
        initial: WorkflowState,
        options: RunOptions,
    ) -> RunOutcome {
        let run_id = options
            .run_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = info_span!("run", graph = %self.name, run_id = %run_id);
        self.drive(ctx, initial, run_id).instrument(span).await
    }

    async fn drive(&self, ctx: &ExecCtx, initial: WorkflowState, run_id: String) -> RunOutcome {
        emit(
            &ctx.event_handler,
            Event::RunStart {
                graph: self.name.clone(),
                run_id: run_id.clone(),
            },
        );
        info!(entry = %self.entry, "run started");

        let mut state = initial;
        let mut current = self.entry.clone();
        let mut trace: Vec<String> = Vec::new();

        loop {
            if state.has_error() {
                break;
            }
            if trace.len() >= self.max_steps {
                warn!(limit = self.max_steps, next = %current, "step budget exhausted");
                state = state.fail(&StepFailure::StepBudget {
                    limit: self.max_steps,
                });
                break;
            }
            if ctx.is_cancelled() {
                info!(next = %current, "run canceled");
                state = state.fail(&StepFailure::Canceled);
                break;
            }
            let Some(step) = self.steps.get(&current) else {
                state = state.fail(&StepFailure::Rejected(format!("unknown step '{current}'")));
                break;
            };

            emit(
                &ctx.event_handler,
                Event::StepStart {
                    run_id: run_id.clone(),
                    step: current.clone(),
                },
            );
            // `next` from an earlier step or the caller must not route this one.
            let input = state.without_next();
            let started = Instant::now();
            let produced = step.run(ctx, &input).await;
            let ok = !produced.has_error();
            debug!(
                step = %current,
                kind = step.kind(),
                ok,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "step finished"
            );
            emit(
                &ctx.event_handler,
                Event::StepEnd {
                    run_id: run_id.clone(),
                    step: current.clone(),
                    ok,
                },
            );

            if let Some(checkpointer) = &self.checkpointer {
                checkpointer.save(Checkpoint {
                    run_id: run_id.clone(),
                    sequence: trace.len(),
                    step: current.clone(),
                    state: produced.clone(),
                });
            }
            trace.push(current.clone());

            let next = self.router.route(&current, &produced);
            state = produced;
            match next {
                Next::Terminal => break,
                Next::Step(name) => current = name,
            }
        }

        match state.error() {
            Some(error) => warn!(steps = trace.len(), error, "run ended with error"),
            None => info!(steps = trace.len(), "run complete"),
        }
        emit(
            &ctx.event_handler,
            Event::RunEnd {
                graph: self.name.clone(),
                run_id: run_id.clone(),
                steps: trace.len(),
                error: state.error().map(str::to_string),
            },
        );

        RunOutcome {
            run_id,
            state,
            trace,
        }
    }
}
