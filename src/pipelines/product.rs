//! Product design pipeline: turn a selected idea into a specification, a
//! technical architecture, and a code layout.

use crate::{
    error::Result,
    graph::{CompiledGraph, StateGraph},
    output_parser::Shape,
    registry::PipelineOptions,
    retry::{RetryConfig, OBJECT_INSTRUCTION},
    router::Next,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{finish, llm_step, PipelineRequest};

pub const GRAPH_NAME: &str = "product";

pub const GENERATE_PRODUCT_SPECIFICATION: &str = "generate_product_specification";
pub const GENERATE_TECHNICAL_ARCHITECTURE: &str = "generate_technical_architecture";
pub const GENERATE_CODE_STRUCTURE: &str = "generate_code_structure";
pub const STEPS: [&str; 3] = [
    GENERATE_PRODUCT_SPECIFICATION,
    GENERATE_TECHNICAL_ARCHITECTURE,
    GENERATE_CODE_STRUCTURE,
];

pub const IDEA: &str = "idea";
pub const ADDITIONAL_REQUIREMENTS: &str = "additional_requirements";
pub const CONSTRAINTS: &str = "constraints";
pub const PRODUCT_SPECIFICATION: &str = "product_specification";
pub const TECHNICAL_ARCHITECTURE: &str = "technical_architecture";
pub const CODE_STRUCTURE: &str = "code_structure";

pub const REQUIRED_INPUTS: &[&str] = &[IDEA];
pub const OUTPUT_FIELDS: &[&str] = &[PRODUCT_SPECIFICATION, TECHNICAL_ARCHITECTURE, CODE_STRUCTURE];

pub const DEFAULT_REQUIREMENTS: &[&str] = &[
    "Must be scalable",
    "Should have a modern UI",
    "Implement best security practices",
];
pub const DEFAULT_CONSTRAINTS: &[&str] = &[
    "MVP should be buildable within 8 weeks",
    "Use standard open-source technologies where possible",
];

const TEMPERATURE: f64 = 0.3;

const SPECIFICATION_PROMPT: &str = r#"You are a SaaS product architect and technical lead.
Write a product specification for this validated idea:

{idea}

Additional requirements:
{additional_requirements}

Constraints:
{constraints}

The specification must cover the product name and description, five to seven features in detail, user stories for the key features, the technology stack per component, a high-level architecture, data models with fields and relationships, API endpoints, and UI components.
Keep it concrete enough for a development team to start building.

Answer with one JSON object:
{{"name": "...", "description": "...", "features": [...], "user_stories": [...], "tech_stack": {{...}}, "architecture": "...", "data_models": [...], "api_endpoints": [...], "ui_components": [...]}}"#;

const ARCHITECTURE_PROMPT: &str = r#"You are a SaaS technical architect.
Design the technical architecture for this product specification:

{product_specification}

Describe the frontend (components, state management, routing), the backend (API structure, services, middleware), the database (schema, relationships, indexes), deployment (infrastructure, CI/CD, environments), and each third-party integration with its purpose.
Account for scalability, security and maintainability.

Answer with one JSON object:
{{"frontend": {{...}}, "backend": {{...}}, "database": {{...}}, "deployment": {{...}}, "integrations": [...]}}"#;

const CODE_STRUCTURE_PROMPT: &str = r#"You are a SaaS developer and technical lead.
Lay out the codebase for this product.

Specification:
{product_specification}

Architecture:
{technical_architecture}

Give the directory structure for frontend and backend, the key files and what each is for, and a phased implementation plan.

Answer with one JSON object:
{{"directory_structure": {{...}}, "key_files": [...], "implementation_plan": [...]}}"#;

/// Typed inputs of the product pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRequest {
    /// Usually the `selected_idea` of an idea run.
    pub idea: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

impl ProductRequest {
    pub fn new(idea: Value) -> Self {
        Self {
            idea,
            additional_requirements: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_requirements = requirements.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints = constraints.into_iter().map(Into::into).collect();
        self
    }
}

impl PipelineRequest for ProductRequest {}

pub fn build(options: &PipelineOptions) -> Result<CompiledGraph> {
    let retry = RetryConfig::once(OBJECT_INSTRUCTION);

    let specification = llm_step(
        options,
        GENERATE_PRODUCT_SPECIFICATION,
        SPECIFICATION_PROMPT,
        "Write the product specification for the idea above.",
        TEMPERATURE,
    )
    .requires(REQUIRED_INPUTS)
    .default_var(ADDITIONAL_REQUIREMENTS, DEFAULT_REQUIREMENTS.to_vec())
    .default_var(CONSTRAINTS, DEFAULT_CONSTRAINTS.to_vec())
    .writes(PRODUCT_SPECIFICATION, Shape::Object)
    .with_retry(retry.clone())
    .then(Next::step(GENERATE_TECHNICAL_ARCHITECTURE));

    let architecture = llm_step(
        options,
        GENERATE_TECHNICAL_ARCHITECTURE,
        ARCHITECTURE_PROMPT,
        "Design the technical architecture for the specification above.",
        TEMPERATURE,
    )
    .requires(&[PRODUCT_SPECIFICATION])
    .writes(TECHNICAL_ARCHITECTURE, Shape::Object)
    .with_retry(retry.clone())
    .then(Next::step(GENERATE_CODE_STRUCTURE));

    let code_structure = llm_step(
        options,
        GENERATE_CODE_STRUCTURE,
        CODE_STRUCTURE_PROMPT,
        "Lay out the code structure for the specification and architecture above.",
        TEMPERATURE,
    )
    .requires(&[PRODUCT_SPECIFICATION, TECHNICAL_ARCHITECTURE])
    .writes(CODE_STRUCTURE, Shape::Object)
    .with_retry(retry);

    let graph = StateGraph::new(GRAPH_NAME)
        .add_step(specification)
        .add_step(architecture)
        .add_step(code_structure)
        .entry(GENERATE_PRODUCT_SPECIFICATION);
    finish(graph, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::testing::{ctx, fenced, scripted};
    use crate::state::WorkflowState;
    use serde_json::json;

    fn replies() -> Vec<String> {
        vec![
            fenced(&json!({"name": "Lintly", "features": ["Inline review"]})),
            fenced(&json!({"frontend": {"framework": "React"}, "backend": {"framework": "Axum"}})),
            fenced(&json!({"directory_structure": {"src": []}, "key_files": [], "implementation_plan": []})),
        ]
    }

    #[tokio::test]
    async fn test_happy_path_with_default_requirements() {
        let mock = scripted(replies());
        let state = ProductRequest::new(json!({"name": "Lintly", "validation_score": 88}))
            .to_state()
            .unwrap();

        let out = build(&PipelineOptions::default())
            .unwrap()
            .invoke(&ctx(mock.clone()), state)
            .await;

        assert!(!out.has_error(), "{:?}", out.error());
        for field in OUTPUT_FIELDS {
            assert!(out.contains(field), "missing {field}");
        }
        assert_eq!(out.get(TECHNICAL_ARCHITECTURE).unwrap()["backend"]["framework"], "Axum");

        let requests = mock.requests();
        let spec_prompt = &requests[0].messages[0].content;
        assert!(spec_prompt.contains("\"name\": \"Lintly\""));
        assert!(spec_prompt.contains("- Should have a modern UI"));
        assert!(spec_prompt.contains("- MVP should be buildable within 8 weeks"));
        assert!(requests[2].messages[0].content.contains("\"framework\": \"React\""));
        assert!(requests.iter().all(|r| r.config.temperature == 0.3));
    }

    #[tokio::test]
    async fn test_caller_constraints_replace_defaults() {
        let mock = scripted(replies());
        let state = ProductRequest::new(json!({"name": "Lintly"}))
            .with_constraints(["Ship in 2 weeks"])
            .to_state()
            .unwrap();

        build(&PipelineOptions::default())
            .unwrap()
            .invoke(&ctx(mock.clone()), state)
            .await;

        let spec_prompt = &mock.requests()[0].messages[0].content;
        assert!(spec_prompt.contains("- Ship in 2 weeks"));
        assert!(!spec_prompt.contains("8 weeks"));
    }

    #[tokio::test]
    async fn test_array_specification_is_rejected() {
        let mock = scripted(vec![fenced(&json!([{"name": "Lintly"}]))]);
        let out = build(&PipelineOptions::default())
            .unwrap()
            .invoke(&ctx(mock), WorkflowState::new().input(IDEA, json!({"name": "Lintly"})))
            .await;
        assert_eq!(
            out.error(),
            Some("generate_product_specification output: expected a JSON object, got an array")
        );
    }

    #[tokio::test]
    async fn test_missing_idea() {
        let mock = scripted(replies());
        let out = build(&PipelineOptions::default())
            .unwrap()
            .invoke(&ctx(mock.clone()), WorkflowState::new().input(IDEA, json!({})))
            .await;
        assert_eq!(out.error(), Some("missing required field 'idea'"));
        assert_eq!(mock.calls(), 0);
    }
}
