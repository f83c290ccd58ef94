//! SaaS idea pipeline: generate candidates, validate them against the
//! [`SaaSIdea`] schema, and select the most promising one.
//!
//! Reads `market_segment` (required), `user_requirements` and
//! `trends_to_consider` (optional lists). Writes `generated_ideas`,
//! `validated_ideas`, `validation_rejected`, and `selected_idea`.

use crate::{
    error::{Result, StepFailure},
    exec_ctx::ExecCtx,
    graph::{CompiledGraph, StateGraph},
    llm_call::StructuredCall,
    output_parser::Shape,
    registry::PipelineOptions,
    retry::{RetryConfig, ARRAY_INSTRUCTION, OBJECT_INSTRUCTION},
    router::Next,
    state::WorkflowState,
    step::{BoxFut, Processed, Step},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{info, warn};

use super::{finish, llm_step, PipelineRequest};

pub const GRAPH_NAME: &str = "idea";

pub const GENERATE_IDEAS: &str = "generate_ideas";
pub const VALIDATE_IDEAS: &str = "validate_ideas";
pub const SELECT_BEST_IDEA: &str = "select_best_idea";
pub const STEPS: [&str; 3] = [GENERATE_IDEAS, VALIDATE_IDEAS, SELECT_BEST_IDEA];

pub const MARKET_SEGMENT: &str = "market_segment";
pub const USER_REQUIREMENTS: &str = "user_requirements";
pub const TRENDS_TO_CONSIDER: &str = "trends_to_consider";
pub const GENERATED_IDEAS: &str = "generated_ideas";
pub const VALIDATED_IDEAS: &str = "validated_ideas";
/// Number of validated candidates dropped for failing the schema.
pub const VALIDATION_REJECTED: &str = "validation_rejected";
pub const SELECTED_IDEA: &str = "selected_idea";
pub const SELECTION_REASONING: &str = "selection_reasoning";

pub const REQUIRED_INPUTS: &[&str] = &[MARKET_SEGMENT];
pub const OUTPUT_FIELDS: &[&str] = &[GENERATED_IDEAS, VALIDATED_IDEAS, SELECTED_IDEA];

pub const DEFAULT_TRENDS: &[&str] = &["Remote work", "AI automation", "Sustainability"];
pub const DEFAULT_REQUIREMENTS: &[&str] = &["Scalable", "User-friendly"];
pub const NUM_IDEAS: u32 = 5;
/// Idea count asked for when re-prompting after an unparseable reply.
pub const RETRY_NUM_IDEAS: u32 = 3;

pub const ONLY_CANDIDATE_REASONING: &str = "This was the only validated idea.";
pub const FALLBACK_REASONING: &str =
    "Selected based on highest validation score due to parsing error.";

const GENERATE_PROMPT: &str = r#"You are a seasoned SaaS product strategist.
Come up with {num_ideas} distinct SaaS product ideas for the {market_segment} market.

Market trends worth weighing:
{trends_to_consider}

Requirements and constraints from the user:
{user_requirements}

For every idea give a product name, a tagline of five to ten words, a description of two or three sentences, the target audience, and the main problem it solves.
Prefer practical ideas that address real pain points over novelty.

Answer with a JSON array holding one object per idea:
[{{"name": "...", "tagline": "...", "description": "...", "target_audience": ["..."], "problem": "..."}}]"#;

const VALIDATE_PROMPT: &str = r#"You are a SaaS market analyst who validates product ideas.
Assess each of these candidate ideas:

{generated_ideas}

For every idea report:
- validation_score: overall viability from 1 to 100
- market_analysis: market_size (text such as "$1-5B"), growth_potential, competition_level and barriers_to_entry, each from 1 to 10
- technical_complexity from 1 to 10
- time_to_mvp (text such as "2-4 weeks")
- recommended_tech_stack, risks, opportunities as lists of strings
- key_features and potential_revenue_streams as lists of strings

Ground the assessment in current market conditions, technical feasibility and business viability. Score honestly; the ideas will not all be equally strong.

Answer with a JSON array of objects that keep each idea's name, tagline, description and target_audience and add the fields above."#;

const SELECT_PROMPT: &str = r#"You are a SaaS product strategist choosing which idea to build.
The validated candidates are:

{validated_ideas}

Weigh the validation score, market opportunity and growth potential, technical feasibility and time to market, and competitive advantage.

Pick exactly one idea. Return it as a JSON object in the same format it was given, adding a "selection_reasoning" field with two or three sentences explaining the choice."#;

/// Market sizing for one idea. Scores run from 1 (low) to 10 (high).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    #[serde(default)]
    pub market_size: String,
    pub growth_potential: Number,
    pub competition_level: Number,
    pub barriers_to_entry: Number,
}

impl MarketAnalysis {
    fn validate(&self) -> std::result::Result<(), String> {
        for (field, score) in [
            ("growth_potential", &self.growth_potential),
            ("competition_level", &self.competition_level),
            ("barriers_to_entry", &self.barriers_to_entry),
        ] {
            check_range(field, score, 1, 10)?;
        }
        Ok(())
    }
}

/// A validated SaaS idea.
///
/// `name` and `validation_score` are mandatory; list fields default to
/// empty and the analysis fields are range-checked only when present.
/// Fields the model adds beyond these are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaaSIdea {
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_audience: Vec<String>,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default)]
    pub potential_revenue_streams: Vec<String>,
    /// Overall viability, 1 to 100. Kept as the model wrote it, integral
    /// or not.
    pub validation_score: Number,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_analysis: Option<MarketAnalysis>,
    /// 1 (simple) to 10 (complex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_complexity: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_mvp: Option<String>,
    #[serde(default)]
    pub recommended_tech_stack: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SaaSIdea {
    /// Check the value ranges serde cannot express.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is empty".into());
        }
        check_range("validation_score", &self.validation_score, 1, 100)?;
        if let Some(analysis) = &self.market_analysis {
            analysis.validate()?;
        }
        if let Some(complexity) = &self.technical_complexity {
            check_range("technical_complexity", complexity, 1, 10)?;
        }
        Ok(())
    }

    /// Parse and validate one candidate produced by the model.
    pub fn from_candidate(value: Value) -> std::result::Result<Self, String> {
        let idea: Self = serde_json::from_value(value).map_err(|e| e.to_string())?;
        idea.validate()?;
        Ok(idea)
    }
}

fn check_range(field: &str, value: &Number, min: u32, max: u32) -> std::result::Result<(), String> {
    match value.as_f64() {
        Some(v) if v >= f64::from(min) && v <= f64::from(max) => Ok(()),
        _ => Err(format!("{field} {value} is outside {min}-{max}")),
    }
}

/// Typed inputs of the idea pipeline.
///
/// ```
/// use forge_agents::pipelines::{idea::IdeaRequest, PipelineRequest};
///
/// let state = IdeaRequest::new("dev tools")
///     .with_trends(["AI pair programming"])
///     .to_state()
///     .unwrap();
/// assert_eq!(state.get_str("market_segment"), Some("dev tools"));
/// assert!(!state.contains("user_requirements"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdeaRequest {
    pub market_segment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trends_to_consider: Vec<String>,
}

impl IdeaRequest {
    pub fn new(market_segment: impl Into<String>) -> Self {
        Self {
            market_segment: market_segment.into(),
            ..Self::default()
        }
    }

    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_requirements = requirements.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_trends<I, S>(mut self, trends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trends_to_consider = trends.into_iter().map(Into::into).collect();
        self
    }
}

impl PipelineRequest for IdeaRequest {}

/// The `selected_idea` of a finished run, if it parses as a [`SaaSIdea`].
pub fn selected_idea(state: &WorkflowState) -> Option<SaaSIdea> {
    state
        .get(SELECTED_IDEA)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

/// Build the idea graph.
pub fn build(options: &PipelineOptions) -> Result<CompiledGraph> {
    let generate = llm_step(
        options,
        GENERATE_IDEAS,
        GENERATE_PROMPT,
        "Generate SaaS product ideas from the information above.",
        0.7,
    )
    .requires(REQUIRED_INPUTS)
    .default_var("num_ideas", NUM_IDEAS)
    .default_var(TRENDS_TO_CONSIDER, DEFAULT_TRENDS.to_vec())
    .default_var(USER_REQUIREMENTS, DEFAULT_REQUIREMENTS.to_vec())
    .writes(GENERATED_IDEAS, Shape::Sequence)
    .with_retry(RetryConfig::once(ARRAY_INSTRUCTION))
    .with_retry_var("num_ideas", RETRY_NUM_IDEAS)
    .then(Next::step(VALIDATE_IDEAS));

    let validate = llm_step(
        options,
        VALIDATE_IDEAS,
        VALIDATE_PROMPT,
        "Validate the SaaS ideas above.",
        0.2,
    )
    .requires(&[GENERATED_IDEAS])
    .writes(VALIDATED_IDEAS, Shape::Sequence)
    .with_retry(RetryConfig::once(ARRAY_INSTRUCTION))
    .postprocess(keep_valid_ideas)
    .then(Next::step(SELECT_BEST_IDEA));

    let select = SelectBestIdea::new(
        StructuredCall::new(
            SELECT_BEST_IDEA,
            SELECT_PROMPT,
            "Select the best SaaS idea from the validated options.",
        )
        .with_model(options.model.clone())
        .with_temperature(options.temperature_or(0.3))
        .with_retry(RetryConfig::once(OBJECT_INSTRUCTION)),
    );

    let graph = StateGraph::new(GRAPH_NAME)
        .add_step(generate)
        .add_step(validate)
        .add_step(select)
        .entry(GENERATE_IDEAS);
    finish(graph, options)
}

/// Drop candidates that fail [`SaaSIdea::validate`]; fail the step when
/// none survive.
fn keep_valid_ideas(candidates: Value) -> std::result::Result<Processed, StepFailure> {
    let items = match candidates {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut kept = Vec::with_capacity(items.len());
    let mut rejected = 0usize;
    for (index, item) in items.into_iter().enumerate() {
        match SaaSIdea::from_candidate(item) {
            Ok(idea) => kept.push(serde_json::to_value(idea).map_err(|e| {
                StepFailure::Rejected(format!("cannot store validated idea: {e}"))
            })?),
            Err(reason) => {
                warn!(step = VALIDATE_IDEAS, index, reason = %reason, "dropping invalid idea");
                rejected += 1;
            }
        }
    }

    if kept.is_empty() {
        return Err(StepFailure::Rejected("No ideas passed validation".into()));
    }
    info!(step = VALIDATE_IDEAS, kept = kept.len(), rejected, "ideas validated");
    Ok(Processed::new(Value::Array(kept)).with_extra(VALIDATION_REJECTED, rejected))
}

/// Chooses one of the validated ideas.
///
/// A single candidate is taken without calling the model. When the model's
/// choice cannot be parsed, even after the re-prompt, the candidate with the
/// highest `validation_score` wins instead.
pub struct SelectBestIdea {
    call: StructuredCall,
}

impl SelectBestIdea {
    pub fn new(call: StructuredCall) -> Self {
        Self { call }
    }

    async fn select(&self, ctx: &ExecCtx, state: &WorkflowState) -> WorkflowState {
        let candidates = match state.require(VALIDATED_IDEAS) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                return state.fail(&StepFailure::Rejected(format!(
                    "{VALIDATED_IDEAS} must be a list of ideas"
                )))
            }
            Err(failure) => {
                warn!(step = SELECT_BEST_IDEA, field = VALIDATED_IDEAS, "required input missing");
                return state.fail(&failure);
            }
        };
        if !candidates.iter().all(Value::is_object) {
            return state.fail(&StepFailure::Rejected(format!(
                "{VALIDATED_IDEAS} must contain JSON objects"
            )));
        }

        if let [only] = candidates.as_slice() {
            info!(step = SELECT_BEST_IDEA, "single candidate, skipping model");
            return finish_selection(state, with_reasoning(only.clone(), ONLY_CANDIDATE_REASONING));
        }

        let selected = match self.call.invoke(ctx, state.as_map()).await {
            Ok(choice @ Value::Object(_)) => choice,
            Ok(_) | Err(StepFailure::Extraction { .. }) => {
                warn!(step = SELECT_BEST_IDEA, "model choice unusable, falling back to highest score");
                with_reasoning(highest_scoring(candidates).clone(), FALLBACK_REASONING)
            }
            Err(failure) => {
                warn!(step = SELECT_BEST_IDEA, kind = failure.kind(), error = %failure, "step failed");
                return state.fail(&failure);
            }
        };
        finish_selection(state, selected)
    }
}

impl Step for SelectBestIdea {
    fn name(&self) -> &str {
        SELECT_BEST_IDEA
    }

    fn kind(&self) -> &'static str {
        "llm"
    }

    fn run<'a>(&'a self, ctx: &'a ExecCtx, state: &'a WorkflowState) -> BoxFut<'a, WorkflowState> {
        Box::pin(self.select(ctx, state))
    }
}

fn finish_selection(state: &WorkflowState, selected: Value) -> WorkflowState {
    let name = selected.get("name").and_then(Value::as_str).unwrap_or("<unnamed>");
    info!(step = SELECT_BEST_IDEA, idea = name, "idea selected");
    state.with(SELECTED_IDEA, selected).with_next(Next::Terminal)
}

/// First candidate with the maximum `validation_score`; a missing score
/// counts as zero.
fn highest_scoring(candidates: &[Value]) -> &Value {
    let score = |v: &Value| v.get("validation_score").and_then(Value::as_f64).unwrap_or(0.0);
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        if score(candidate) > score(best) {
            best = candidate;
        }
    }
    best
}

fn with_reasoning(mut idea: Value, reasoning: &str) -> Value {
    if let Value::Object(fields) = &mut idea {
        fields.insert(SELECTION_REASONING.into(), reasoning.into());
    }
    idea
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::testing::{ctx, fenced, scripted};
    use serde_json::json;

    fn idea(name: &str, score: u32) -> Value {
        json!({
            "name": name,
            "tagline": format!("{name} for busy teams"),
            "description": "Does one thing well.",
            "target_audience": ["Developers"],
            "validation_score": score,
            "market_analysis": {
                "market_size": "$1-5B",
                "growth_potential": 7,
                "competition_level": 5,
                "barriers_to_entry": 4
            },
            "technical_complexity": 6,
            "time_to_mvp": "4-6 weeks"
        })
    }

    fn graph() -> CompiledGraph {
        build(&PipelineOptions::default()).unwrap()
    }

    #[test]
    fn test_saas_idea_validation() {
        assert!(SaaSIdea::from_candidate(idea("Lintly", 80)).is_ok());

        let err = SaaSIdea::from_candidate(idea("Lintly", 0)).unwrap_err();
        assert_eq!(err, "validation_score 0 is outside 1-100");

        let mut bad = idea("Lintly", 80);
        bad["market_analysis"]["growth_potential"] = json!(11);
        assert!(SaaSIdea::from_candidate(bad).unwrap_err().contains("growth_potential"));

        assert!(SaaSIdea::from_candidate(json!({"name": "No score"})).is_err());
    }

    #[test]
    fn test_extra_fields_survive() {
        let mut raw = idea("Lintly", 80);
        raw["problem"] = json!("Slow code review");
        let parsed = SaaSIdea::from_candidate(raw).unwrap();
        assert_eq!(parsed.extra.get("problem"), Some(&json!("Slow code review")));
        assert_eq!(serde_json::to_value(&parsed).unwrap()["problem"], "Slow code review");
    }

    #[test]
    fn test_keep_valid_ideas_counts_rejects() {
        let out = keep_valid_ideas(json!([idea("A", 70), {"name": "B"}, idea("C", 101)])).unwrap();
        assert_eq!(out.value.as_array().unwrap().len(), 1);
        assert_eq!(out.extra, vec![(VALIDATION_REJECTED.to_string(), json!(2))]);

        let err = keep_valid_ideas(json!([{"name": "B"}])).unwrap_err();
        assert_eq!(err.to_string(), "No ideas passed validation");
    }

    #[test]
    fn test_highest_scoring_keeps_first_maximum() {
        let pool = vec![
            json!({"name": "a", "validation_score": 60}),
            json!({"name": "b", "validation_score": 90}),
            json!({"name": "c", "validation_score": 90}),
            json!({"name": "d"}),
        ];
        assert_eq!(highest_scoring(&pool)["name"], "b");
    }

    #[tokio::test]
    async fn test_happy_path() {
        let mock = scripted(vec![
            fenced(&json!([{"name": "A"}, {"name": "B"}])),
            fenced(&json!([idea("A", 72), idea("B", 88)])),
            fenced(&{
                let mut chosen = idea("B", 88);
                chosen["selection_reasoning"] = json!("Strongest market.");
                chosen
            }),
        ]);
        let out = graph()
            .invoke(&ctx(mock.clone()), WorkflowState::new().input(MARKET_SEGMENT, "dev tools"))
            .await;

        assert!(!out.has_error(), "{:?}", out.error());
        for field in OUTPUT_FIELDS {
            assert!(out.contains(field), "missing {field}");
        }
        assert_eq!(out.get(VALIDATION_REJECTED), Some(&json!(0)));
        let chosen = selected_idea(&out).unwrap();
        assert_eq!(chosen.name, "B");
        assert_eq!(chosen.extra[SELECTION_REASONING], "Strongest market.");
        assert_eq!(mock.calls(), 3);

        let requests = mock.requests();
        let first = &requests[0].messages[0].content;
        assert!(first.contains("5 distinct SaaS product ideas for the dev tools market"));
        assert!(first.contains("- AI automation"));
        assert!(first.contains("- User-friendly"));
        assert!(first.contains(r#"[{"name": "...""#));
        assert_eq!(requests[0].config.temperature, 0.7);
        assert_eq!(requests[1].config.temperature, 0.2);
        assert_eq!(requests[2].config.temperature, 0.3);
    }

    #[tokio::test]
    async fn test_generation_reprompt_asks_for_fewer_ideas() {
        let mock = scripted(vec![
            "I have some great ideas!".into(),
            fenced(&json!([{"name": "A"}])),
            fenced(&json!([idea("A", 50)])),
        ]);
        let out = graph()
            .invoke(&ctx(mock.clone()), WorkflowState::new().input(MARKET_SEGMENT, "fintech"))
            .await;

        let retry = &mock.requests()[1].messages[0].content;
        assert!(retry.contains("3 distinct SaaS product ideas"));
        assert!(retry.ends_with(ARRAY_INSTRUCTION));
        // one validated idea: selection never calls the model
        assert_eq!(mock.calls(), 3);
        assert_eq!(out.get(SELECTED_IDEA).unwrap()[SELECTION_REASONING], ONLY_CANDIDATE_REASONING);
    }

    #[tokio::test]
    async fn test_unparseable_selection_falls_back_to_top_score() {
        let mock = scripted(vec![
            fenced(&json!([{"name": "A"}, {"name": "B"}, {"name": "C"}])),
            fenced(&json!([idea("A", 61), idea("B", 93), idea("C", 77)])),
            "B is clearly the best.".into(),
            "Really, pick B.".into(),
        ]);
        let out = graph()
            .invoke(&ctx(mock.clone()), WorkflowState::new().input(MARKET_SEGMENT, "dev tools"))
            .await;

        assert!(!out.has_error());
        assert_eq!(mock.calls(), 4);
        let selected = out.get(SELECTED_IDEA).unwrap();
        assert_eq!(selected["name"], "B");
        assert_eq!(selected[SELECTION_REASONING], FALLBACK_REASONING);
    }

    #[test]
    fn test_fractional_scores_are_accepted() {
        let mut raw = idea("Lintly", 80);
        raw["validation_score"] = json!(61.5);
        raw["technical_complexity"] = json!(6.0);
        raw["market_analysis"]["growth_potential"] = json!(7.5);
        let parsed = SaaSIdea::from_candidate(raw).unwrap();
        assert_eq!(parsed.validation_score.as_f64(), Some(61.5));

        raw = idea("Lintly", 80);
        raw["validation_score"] = json!(100.5);
        assert_eq!(
            SaaSIdea::from_candidate(raw).unwrap_err(),
            "validation_score 100.5 is outside 1-100"
        );
    }

    #[tokio::test]
    async fn test_float_scores_reach_selection() {
        let mock = scripted(vec![
            fenced(&json!([{"name": "A"}, {"name": "B"}, {"name": "C"}])),
            fenced(&json!([
                {"name": "A", "validation_score": 61.5},
                {"name": "B", "validation_score": 93.0},
                {"name": "C", "validation_score": 77.2}
            ])),
            "B.".into(),
            "Still B.".into(),
        ]);
        let out = graph()
            .invoke(&ctx(mock.clone()), WorkflowState::new().input(MARKET_SEGMENT, "dev tools"))
            .await;

        assert!(!out.has_error(), "{:?}", out.error());
        assert_eq!(out.get(VALIDATED_IDEAS).unwrap().as_array().unwrap().len(), 3);
        assert_eq!(out.get(VALIDATION_REJECTED), Some(&json!(0)));
        let selected = out.get(SELECTED_IDEA).unwrap();
        assert_eq!(selected["name"], "B");
        assert_eq!(selected["validation_score"], json!(93.0));
        assert_eq!(mock.calls(), 4);
    }

    #[tokio::test]
    async fn test_all_candidates_invalid_fails_run() {
        let mock = scripted(vec![
            fenced(&json!([{"name": "A"}])),
            fenced(&json!([{"name": "A", "validation_score": 500}])),
        ]);
        let out = graph()
            .invoke(&ctx(mock.clone()), WorkflowState::new().input(MARKET_SEGMENT, "dev tools"))
            .await;

        assert_eq!(out.error(), Some("No ideas passed validation"));
        assert!(out.contains(GENERATED_IDEAS));
        assert!(!out.contains(SELECTED_IDEA));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_selection_transport_error_is_not_masked() {
        use crate::backend::{MockBackend, MockReply};
        use std::sync::Arc;

        let mock = Arc::new(MockBackend::from_replies(vec![
            MockReply::Text(fenced(&json!([{"name": "A"}, {"name": "B"}]))),
            MockReply::Text(fenced(&json!([idea("A", 40), idea("B", 45)]))),
            MockReply::Fail("connection reset".into()),
        ]));
        let out = graph()
            .invoke(&ctx(mock), WorkflowState::new().input(MARKET_SEGMENT, "dev tools"))
            .await;
        assert_eq!(out.error(), Some("connection reset"));
        assert!(out.contains(VALIDATED_IDEAS));
    }
}
