//! Name → factory lookup for pipelines.
//!
//! A [`PipelineRegistry`] is an ordinary value: build one at startup
//! (usually with [`PipelineRegistry::with_builtin`]) and hand it to whatever
//! composes and runs graphs. There is no global registry.

use crate::{
    checkpoint::Checkpointer,
    error::{FlowError, Result},
    graph::CompiledGraph,
    llm_call::DEFAULT_MODEL,
    pipelines,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a configured graph.
pub type PipelineFactory = Arc<dyn Fn(&PipelineOptions) -> Result<CompiledGraph> + Send + Sync>;

/// Knobs every factory understands.
#[derive(Clone)]
pub struct PipelineOptions {
    pub model: String,
    /// Replaces every step's own temperature when set.
    pub temperature: Option<f64>,
    /// Step budget; the graph default when `None`.
    pub max_steps: Option<usize>,
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_steps: None,
            checkpointer: None,
        }
    }
}

impl std::fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_steps", &self.max_steps)
            .field("has_checkpointer", &self.checkpointer.is_some())
            .finish()
    }
}

impl PipelineOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_steps(mut self, limit: usize) -> Self {
        self.max_steps = Some(limit);
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// `step_default` unless a temperature override is set.
    pub fn temperature_or(&self, step_default: f64) -> f64 {
        self.temperature.unwrap_or(step_default)
    }
}

/// Registered pipeline factories, listed in name order.
///
/// # Example
///
/// ```
/// use forge_agents::{PipelineOptions, PipelineRegistry};
///
/// let registry = PipelineRegistry::with_builtin();
/// assert!(registry.list().contains(&"idea"));
///
/// let graph = registry.build("idea", &PipelineOptions::default()).unwrap();
/// assert_eq!(graph.entry(), "generate_ideas");
/// ```
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    factories: BTreeMap<String, PipelineFactory>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the idea, product, deployment, marketing, and
    /// product_flow pipelines.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(pipelines::idea::GRAPH_NAME, pipelines::idea::build);
        registry.register(pipelines::product::GRAPH_NAME, pipelines::product::build);
        registry.register(pipelines::deployment::GRAPH_NAME, pipelines::deployment::build);
        registry.register(pipelines::marketing::GRAPH_NAME, pipelines::marketing::build);
        registry.register(pipelines::product_flow::GRAPH_NAME, pipelines::product_flow::build);
        registry
    }

    /// Store `factory` under `name`, replacing any earlier registration.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&PipelineOptions) -> Result<CompiledGraph> + Send + Sync + 'static,
    ) -> &mut Self {
        let name = name.into();
        debug!(pipeline = %name, "registering pipeline");
        self.factories.insert(name, Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<PipelineFactory> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Resolve `name` and build its graph.
    pub fn build(&self, name: &str, options: &PipelineOptions) -> Result<CompiledGraph> {
        let factory = self.factories.get(name).ok_or_else(|| {
            FlowError::InvalidConfig(format!(
                "unknown pipeline '{name}' (registered: {})",
                self.list().join(", ")
            ))
        })?;
        factory(options)
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointer;
    use crate::graph::StateGraph;
    use crate::state::WorkflowState;
    use crate::step::FnStep;

    #[test]
    fn test_builtin_pipelines_are_listed_in_order() {
        let registry = PipelineRegistry::with_builtin();
        assert_eq!(
            registry.list(),
            ["deployment", "idea", "marketing", "product", "product_flow"]
        );
    }

    #[test]
    fn test_every_builtin_compiles() {
        let registry = PipelineRegistry::with_builtin();
        let options = PipelineOptions::default().with_max_steps(10);
        for name in registry.list() {
            let graph = registry.build(name, &options).unwrap();
            assert_eq!(graph.name(), name);
            assert_eq!(graph.max_steps(), 10);
        }
    }

    #[test]
    fn test_register_get_and_unknown() {
        let mut registry = PipelineRegistry::new();
        assert!(registry.get("echo").is_none());

        registry.register("echo", |_opts: &PipelineOptions| {
            StateGraph::new("echo")
                .add_step(FnStep::new("echo", |s: &WorkflowState| s.clone()))
                .compile()
        });
        assert!(registry.contains("echo"));
        let factory = registry.get("echo").unwrap();
        assert_eq!(factory(&PipelineOptions::default()).unwrap().entry(), "echo");

        let err = registry.build("nope", &PipelineOptions::default()).unwrap_err();
        assert!(err.to_string().contains("unknown pipeline 'nope'"));
        assert!(err.to_string().contains("echo"));
    }

    #[test]
    fn test_options_builders() {
        let opts = PipelineOptions::default()
            .with_model("gpt-4o-mini")
            .with_temperature(0.1)
            .with_checkpointer(Arc::new(MemoryCheckpointer::new()));
        assert_eq!(opts.model, "gpt-4o-mini");
        assert_eq!(opts.temperature_or(0.7), 0.1);
        assert_eq!(PipelineOptions::default().temperature_or(0.7), 0.7);
        assert!(format!("{opts:?}").contains("has_checkpointer: true"));
    }
}
