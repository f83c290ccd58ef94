//! Deployment planning pipeline: plan, platform configuration, and a
//! simulated execution report.

use crate::{
    error::Result,
    graph::{CompiledGraph, StateGraph},
    output_parser::Shape,
    registry::PipelineOptions,
    retry::{RetryConfig, OBJECT_INSTRUCTION},
    router::Next,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{finish, llm_step, PipelineRequest};

pub const GRAPH_NAME: &str = "deployment";

pub const CREATE_DEPLOYMENT_PLAN: &str = "create_deployment_plan";
pub const CREATE_DEPLOYMENT_CONFIG: &str = "create_deployment_config";
pub const EXECUTE_DEPLOYMENT: &str = "execute_deployment";
pub const STEPS: [&str; 3] = [CREATE_DEPLOYMENT_PLAN, CREATE_DEPLOYMENT_CONFIG, EXECUTE_DEPLOYMENT];

pub const PRODUCT_SPEC: &str = "product_spec";
pub const TARGET_PLATFORM: &str = "target_platform";
pub const DOMAIN: &str = "domain";
pub const ENVIRONMENT_VARIABLES: &str = "environment_variables";
pub const DEPLOYMENT_PLAN: &str = "deployment_plan";
pub const DEPLOYMENT_CONFIG: &str = "deployment_config";
pub const DEPLOYMENT_RESULT: &str = "deployment_result";

pub const REQUIRED_INPUTS: &[&str] = &[PRODUCT_SPEC, TARGET_PLATFORM];
pub const OUTPUT_FIELDS: &[&str] = &[DEPLOYMENT_PLAN, DEPLOYMENT_CONFIG, DEPLOYMENT_RESULT];

pub const DEFAULT_DOMAIN: &str = "Not specified";

const TEMPERATURE: f64 = 0.3;

const PLAN_PROMPT: &str = r#"You are a DevOps engineer who ships SaaS products.
Plan the deployment of this product:

{product_spec}

Target platform: {target_platform}
Domain: {domain}

Cover the components to deploy (frontend, backend, database and so on), their dependencies, the deployment steps in order, the platform configuration, an estimate of how long it takes, and the post-deployment work such as monitoring and smoke tests.

Answer with one JSON object:
{{"components": [...], "dependencies": [...], "steps": [...], "platform_configuration": {{...}}, "estimated_time": "...", "post_deployment": [...]}}"#;

const CONFIG_PROMPT: &str = r#"You are a DevOps engineer specializing in {target_platform}.
Write the deployment configuration for this plan:

{deployment_plan}

Environment variables to include:
{environment_variables}

Cover platform settings, environment variables, resource requirements, scaling, and networking and security settings. It should be usable by an automated deployment.

Answer with one JSON object:
{{"platform_settings": {{...}}, "environment_variables": {{...}}, "resources": {{...}}, "scaling": {{...}}, "networking": {{...}}}}"#;

const EXECUTE_PROMPT: &str = r#"You are a DevOps engineer specializing in {target_platform}.
Simulate running this deployment.

Plan:
{deployment_plan}

Configuration:
{deployment_config}

Report the deployment status, the application URL (a placeholder is fine), the deployment logs, metrics such as build and deploy time, any issues hit along the way, and recommendations. Keep the simulation realistic.

Answer with one JSON object:
{{"status": "...", "url": "...", "logs": [...], "metrics": {{...}}, "issues": [...], "recommendations": [...]}}"#;

/// Typed inputs of the deployment pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub product_spec: Value,
    /// e.g. `"Vercel"`, `"Railway"`, `"AWS"`.
    pub target_platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub environment_variables: Map<String, Value>,
}

impl DeploymentRequest {
    pub fn new(product_spec: Value, target_platform: impl Into<String>) -> Self {
        Self {
            product_spec,
            target_platform: target_platform.into(),
            domain: None,
            environment_variables: Map::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables
            .insert(key.into(), Value::String(value.into()));
        self
    }
}

impl PipelineRequest for DeploymentRequest {}

pub fn build(options: &PipelineOptions) -> Result<CompiledGraph> {
    let retry = RetryConfig::once(OBJECT_INSTRUCTION);

    let plan = llm_step(
        options,
        CREATE_DEPLOYMENT_PLAN,
        PLAN_PROMPT,
        "Create the deployment plan from the information above.",
        TEMPERATURE,
    )
    .requires(REQUIRED_INPUTS)
    .default_var(DOMAIN, DEFAULT_DOMAIN)
    .writes(DEPLOYMENT_PLAN, Shape::Object)
    .with_retry(retry.clone())
    .then(Next::step(CREATE_DEPLOYMENT_CONFIG));

    let config = llm_step(
        options,
        CREATE_DEPLOYMENT_CONFIG,
        CONFIG_PROMPT,
        "Create the deployment configuration for the plan above.",
        TEMPERATURE,
    )
    .requires(&[DEPLOYMENT_PLAN, TARGET_PLATFORM])
    .default_var(ENVIRONMENT_VARIABLES, json!({}))
    .writes(DEPLOYMENT_CONFIG, Shape::Object)
    .with_retry(retry.clone())
    .then(Next::step(EXECUTE_DEPLOYMENT));

    let execute = llm_step(
        options,
        EXECUTE_DEPLOYMENT,
        EXECUTE_PROMPT,
        "Simulate the deployment described above.",
        TEMPERATURE,
    )
    .requires(&[DEPLOYMENT_PLAN, DEPLOYMENT_CONFIG, TARGET_PLATFORM])
    .writes(DEPLOYMENT_RESULT, Shape::Object)
    .with_retry(retry);

    let graph = StateGraph::new(GRAPH_NAME)
        .add_step(plan)
        .add_step(config)
        .add_step(execute)
        .entry(CREATE_DEPLOYMENT_PLAN);
    finish(graph, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::testing::{ctx, fenced, scripted};
    use crate::state::WorkflowState;

    fn replies() -> Vec<String> {
        vec![
            fenced(&json!({"components": ["frontend", "api"], "estimated_time": "2 hours"})),
            fenced(&json!({"platform_settings": {"region": "iad1"}})),
            fenced(&json!({"status": "success", "url": "https://lintly.vercel.app"})),
        ]
    }

    #[tokio::test]
    async fn test_happy_path() {
        let mock = scripted(replies());
        let state = DeploymentRequest::new(json!({"name": "Lintly"}), "Vercel")
            .with_env("DATABASE_URL", "postgres://db")
            .to_state()
            .unwrap();

        let out = build(&PipelineOptions::default())
            .unwrap()
            .invoke(&ctx(mock.clone()), state)
            .await;

        assert!(!out.has_error(), "{:?}", out.error());
        assert_eq!(out.get(DEPLOYMENT_RESULT).unwrap()["status"], "success");

        let requests = mock.requests();
        let plan_prompt = &requests[0].messages[0].content;
        assert!(plan_prompt.contains("Target platform: Vercel"));
        assert!(plan_prompt.contains("Domain: Not specified"));
        let config_prompt = &requests[1].messages[0].content;
        assert!(config_prompt.starts_with("You are a DevOps engineer specializing in Vercel."));
        assert!(config_prompt.contains("\"DATABASE_URL\": \"postgres://db\""));
    }

    #[tokio::test]
    async fn test_missing_platform_names_the_field() {
        let mock = scripted(replies());
        let state = WorkflowState::new().input(PRODUCT_SPEC, json!({"name": "Lintly"}));

        let out = build(&PipelineOptions::default())
            .unwrap()
            .invoke(&ctx(mock.clone()), state)
            .await;

        assert_eq!(out.error(), Some("missing required field 'target_platform'"));
        for field in OUTPUT_FIELDS {
            assert!(!out.contains(field));
        }
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_environment_renders_as_empty_object() {
        let mock = scripted(replies());
        let state = DeploymentRequest::new(json!({"name": "Lintly"}), "Railway")
            .with_domain("lintly.dev")
            .to_state()
            .unwrap();

        build(&PipelineOptions::default())
            .unwrap()
            .invoke(&ctx(mock.clone()), state)
            .await;

        let requests = mock.requests();
        assert!(requests[0].messages[0].content.contains("Domain: lintly.dev"));
        assert!(requests[1].messages[0]
            .content
            .contains("Environment variables to include:\n{}\n"));
    }
}
