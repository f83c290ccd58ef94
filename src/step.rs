//! Workflow steps.
//!
//! A [`Step`] is a total function from state to state: it never returns an
//! error. Failures are written into the state's `error` field via
//! [`WorkflowState::fail`] and the router short-circuits from there.
//!
//! Two ready-made implementations cover most graphs:
//!
//! - [`LlmStep`] validates required inputs, makes one [`StructuredCall`],
//!   normalizes the extracted value to a [`Shape`], and writes it to an
//!   output field.
//! - [`FnStep`] wraps a plain closure for steps that need no model.

use crate::{
    error::StepFailure,
    exec_ctx::ExecCtx,
    llm_call::StructuredCall,
    output_parser::Shape,
    retry::RetryConfig,
    router::Next,
    state::{is_blank, WorkflowState},
};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{info, warn};

/// A boxed, pinned, Send future, the return type of [`Step::run`].
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe unit of work in a graph.
///
/// Implementations must not mutate `state`; they return a new snapshot
/// (see [`WorkflowState::with`]). Steps may be run concurrently for
/// different runs, so any internal state must be synchronized.
pub trait Step: Send + Sync {
    /// Unique name within a graph; also the value other steps put in `next`.
    fn name(&self) -> &str;

    /// Stable type label for logs (e.g. `"llm"`, `"fn"`).
    fn kind(&self) -> &'static str {
        "custom"
    }

    fn run<'a>(&'a self, ctx: &'a ExecCtx, state: &'a WorkflowState) -> BoxFut<'a, WorkflowState>;
}

/// Result of a post-extraction hook: the value to store, plus any extra
/// fields to write alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub value: Value,
    pub extra: Vec<(String, Value)>,
}

impl Processed {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }
}

/// Hook run on the shape-normalized value before it is stored.
pub type PostprocessFn = Arc<dyn Fn(Value) -> Result<Processed, StepFailure> + Send + Sync>;

/// A step backed by one structured model call.
///
/// # Example
///
/// ```
/// use forge_agents::output_parser::Shape;
/// use forge_agents::step::{LlmStep, Step};
/// use forge_agents::Next;
///
/// let step = LlmStep::new(
///     "create_deployment_plan",
///     "Plan a deployment of {product_spec} to {target_platform}.",
///     "Create a deployment plan.",
/// )
/// .requires(&["product_spec", "target_platform"])
/// .default_var("domain", "Not specified")
/// .writes("deployment_plan", Shape::Object)
/// .then(Next::step("create_deployment_config"));
///
/// assert_eq!(step.name(), "create_deployment_plan");
/// ```
pub struct LlmStep {
    call: StructuredCall,
    required: Vec<String>,
    defaults: Map<String, Value>,
    output: String,
    shape: Shape,
    successor: Next,
    postprocess: Option<PostprocessFn>,
}

impl LlmStep {
    /// A step named `name` that writes its result to a field of the same
    /// name and then ends the run. Use the builder methods to change that.
    pub fn new(
        name: impl Into<String>,
        system_template: impl Into<String>,
        human_message: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            output: name.clone(),
            call: StructuredCall::new(name, system_template, human_message),
            required: Vec::new(),
            defaults: Map::new(),
            shape: Shape::Any,
            successor: Next::Terminal,
            postprocess: None,
        }
    }

    /// Fields that must be present and non-empty before the model is called.
    pub fn requires(mut self, fields: &[&str]) -> Self {
        self.required.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Template value used when the state lacks `key` or holds a blank value.
    pub fn default_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Field the extracted value is written to, and its expected shape.
    pub fn writes(mut self, field: impl Into<String>, shape: Shape) -> Self {
        self.output = field.into();
        self.shape = shape;
        self
    }

    /// Routing annotation written after a successful run.
    pub fn then(mut self, next: Next) -> Self {
        self.successor = next;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.call = self.call.with_model(model);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.call = self.call.with_temperature(temperature);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.call = self.call.with_retry(retry);
        self
    }

    pub fn with_retry_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.call = self.call.with_retry_var(key, value);
        self
    }

    pub fn postprocess(
        mut self,
        f: impl Fn(Value) -> Result<Processed, StepFailure> + Send + Sync + 'static,
    ) -> Self {
        self.postprocess = Some(Arc::new(f));
        self
    }

    pub fn call(&self) -> &StructuredCall {
        &self.call
    }

    pub fn output_field(&self) -> &str {
        &self.output
    }

    pub fn successor(&self) -> &Next {
        &self.successor
    }

    /// State fields plus defaults for anything missing or blank.
    pub fn template_vars(&self, state: &WorkflowState) -> Map<String, Value> {
        let mut vars = state.as_map().clone();
        for (key, default) in &self.defaults {
            if vars.get(key).map_or(true, is_blank) {
                vars.insert(key.clone(), default.clone());
            }
        }
        vars
    }

    async fn execute(&self, ctx: &ExecCtx, state: &WorkflowState) -> WorkflowState {
        let name = self.call.step();

        for field in &self.required {
            if let Err(failure) = state.require(field) {
                warn!(step = name, field = %field, "required input missing");
                return state.fail(&failure);
            }
        }

        let extracted = match self.call.invoke(ctx, &self.template_vars(state)).await {
            Ok(value) => value,
            Err(failure) => {
                warn!(step = name, kind = failure.kind(), error = %failure, "step failed");
                return state.fail(&failure);
            }
        };

        let normalized = match self.shape.normalize(extracted) {
            Ok(value) => value,
            Err(mismatch) => {
                let failure = StepFailure::Rejected(format!("{name} output: {mismatch}"));
                warn!(step = name, error = %failure, "unexpected output shape");
                return state.fail(&failure);
            }
        };

        let processed = match &self.postprocess {
            Some(hook) => match hook(normalized) {
                Ok(processed) => processed,
                Err(failure) => {
                    warn!(step = name, kind = failure.kind(), error = %failure, "output rejected");
                    return state.fail(&failure);
                }
            },
            None => Processed::new(normalized),
        };

        info!(step = name, field = %self.output, next = %self.successor, "step complete");
        state
            .with(self.output.clone(), processed.value)
            .with_fields(processed.extra)
            .with_next(self.successor.clone())
    }
}

impl Step for LlmStep {
    fn name(&self) -> &str {
        self.call.step()
    }

    fn kind(&self) -> &'static str {
        "llm"
    }

    fn run<'a>(&'a self, ctx: &'a ExecCtx, state: &'a WorkflowState) -> BoxFut<'a, WorkflowState> {
        Box::pin(self.execute(ctx, state))
    }
}

/// A step backed by a synchronous closure; no model call.
///
/// ```
/// use forge_agents::step::FnStep;
/// use forge_agents::WorkflowState;
///
/// let shout = FnStep::new("shout", |state: &WorkflowState| {
///     let text = state.get_str("text").unwrap_or_default().to_uppercase();
///     state.with("text", text)
/// });
/// # let _ = shout;
/// ```
pub struct FnStep<F> {
    name: String,
    f: F,
}

impl<F> FnStep<F>
where
    F: Fn(&WorkflowState) -> WorkflowState + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Step for FnStep<F>
where
    F: Fn(&WorkflowState) -> WorkflowState + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "fn"
    }

    fn run<'a>(&'a self, _ctx: &'a ExecCtx, state: &'a WorkflowState) -> BoxFut<'a, WorkflowState> {
        Box::pin(async move { (self.f)(state) })
    }
}
