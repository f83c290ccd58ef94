//! Marketing pipeline: strategy first, then SEO, social media, and sales
//! copy derived from it.

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

pub const GRAPH_NAME: &str = "marketing";

pub const CREATE_MARKETING_STRATEGY: &str = "create_marketing_strategy";
pub const CREATE_SEO_CONTENT: &str = "create_seo_content";
pub const CREATE_SOCIAL_MEDIA_CONTENT: &str = "create_social_media_content";
pub const CREATE_MARKETING_COPY: &str = "create_marketing_copy";
pub const STEPS: [&str; 4] = [
    CREATE_MARKETING_STRATEGY,
    CREATE_SEO_CONTENT,
    CREATE_SOCIAL_MEDIA_CONTENT,
    CREATE_MARKETING_COPY,
];

pub const PRODUCT: &str = "product";
pub const TARGET_AUDIENCE: &str = "target_audience";
pub const MARKETING_CHANNELS: &str = "marketing_channels";
pub const TONE: &str = "tone";
pub const CAMPAIGN_GOALS: &str = "campaign_goals";
pub const MARKETING_STRATEGY: &str = "marketing_strategy";
pub const SEO_CONTENT: &str = "seo_content";
pub const SOCIAL_MEDIA_CONTENT: &str = "social_media_content";
pub const MARKETING_COPY: &str = "marketing_copy";

pub const REQUIRED_INPUTS: &[&str] = &[PRODUCT, TARGET_AUDIENCE];
pub const OUTPUT_FIELDS: &[&str] = &[
    MARKETING_STRATEGY,
    SEO_CONTENT,
    SOCIAL_MEDIA_CONTENT,
    MARKETING_COPY,
];

pub const DEFAULT_STRATEGY_CHANNELS: &[&str] = &[
    "LinkedIn",
    "Twitter",
    "Facebook",
    "Instagram",
    "Email",
    "Content Marketing",
];
/// Social posts only target the social networks.
pub const DEFAULT_SOCIAL_CHANNELS: &[&str] = &["LinkedIn", "Twitter", "Facebook", "Instagram"];
pub const DEFAULT_CAMPAIGN_GOALS: &[&str] = &[
    "Increase brand awareness",
    "Generate leads",
    "Drive product sign-ups",
];
pub const DEFAULT_TONE: &str = "Professional but approachable";

const STRATEGY_PROMPT: &str = r#"You are a SaaS marketing strategist.
Build a marketing strategy for this product:

{product}

Target audience:
{target_audience}

Channels to consider:
{marketing_channels}

Campaign goals:
{campaign_goals}

Include audience personas (demographics, pain points, goals), a positioning statement, unique selling points, recommended channels with the reasoning behind each, a content strategy, growth tactics, and the KPIs to track.

Answer with one JSON object:
{{"personas": [...], "positioning": "...", "unique_selling_points": [...], "channels": [...], "content_strategy": "...", "growth_tactics": [...], "kpis": [...]}}"#;

const SEO_PROMPT: &str = r#"You are an SEO content strategist for SaaS products.
Write search-optimized content for this product:

{product}

Marketing strategy:
{marketing_strategy}

Tone: {tone}

Provide a page title of 50 to 60 characters, a meta description of 150 to 160 characters, primary and secondary keywords, the H1, page sections with headings and body text, blog post ideas with outlines, and FAQ entries.

Answer with one JSON object:
{{"page_title": "...", "meta_description": "...", "keywords": {{"primary": [...], "secondary": [...]}}, "h1": "...", "sections": [...], "blog_posts": [...], "faq": [...]}}"#;

const SOCIAL_PROMPT: &str = r#"You are a social media marketer for SaaS products.
Create social content for this product:

{product}

Marketing strategy:
{marketing_strategy}

Platforms:
{marketing_channels}

Tone: {tone}

Provide at least five posts per platform, a two-week content calendar, prompts for generating the post visuals, and hashtag recommendations.

Answer with one JSON object:
{{"posts": {{"<platform>": [...]}}, "content_calendar": [...], "image_prompts": [...], "hashtags": [...]}}"#;

const COPY_PROMPT: &str = r#"You are a copywriter for SaaS products.
Write marketing copy for this product:

{product}

Marketing strategy:
{marketing_strategy}

Tone: {tone}

Provide a tagline, the value proposition, a one or two sentence description, a one or two paragraph description, feature highlights with titles, calls to action for different contexts, testimonial templates, and pricing page copy.

Answer with one JSON object:
{{"tagline": "...", "value_proposition": "...", "short_description": "...", "long_description": "...", "feature_highlights": [...], "calls_to_action": [...], "testimonial_templates": [...], "pricing_copy": "..."}}"#;

/// Typed inputs of the marketing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingRequest {
    pub product: Value,
    /// Free text or a list of segments.
    pub target_audience: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marketing_channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub campaign_goals: Vec<String>,
}

impl MarketingRequest {
    pub fn new(product: Value, target_audience: impl Into<Value>) -> Self {
        Self {
            product,
            target_audience: target_audience.into(),
            marketing_channels: Vec::new(),
            tone: None,
            campaign_goals: Vec::new(),
        }
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.marketing_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn with_goals<I, S>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.campaign_goals = goals.into_iter().map(Into::into).collect();
        self
    }
}

impl PipelineRequest for MarketingRequest {}

pub fn build(options: &PipelineOptions) -> Result<CompiledGraph> {
    let retry = RetryConfig::once(OBJECT_INSTRUCTION);
    let after_strategy = [PRODUCT, MARKETING_STRATEGY];

    let strategy = llm_step(
        options,
        CREATE_MARKETING_STRATEGY,
        STRATEGY_PROMPT,
        "Create the marketing strategy from the information above.",
        0.5,
    )
    .requires(REQUIRED_INPUTS)
    .default_var(MARKETING_CHANNELS, DEFAULT_STRATEGY_CHANNELS.to_vec())
    .default_var(CAMPAIGN_GOALS, DEFAULT_CAMPAIGN_GOALS.to_vec())
    .writes(MARKETING_STRATEGY, Shape::Object)
    .with_retry(retry.clone())
    .then(Next::step(CREATE_SEO_CONTENT));

    let seo = llm_step(
        options,
        CREATE_SEO_CONTENT,
        SEO_PROMPT,
        "Create the SEO content from the information above.",
        0.5,
    )
    .requires(&after_strategy)
    .default_var(TONE, DEFAULT_TONE)
    .writes(SEO_CONTENT, Shape::Object)
    .with_retry(retry.clone())
    .then(Next::step(CREATE_SOCIAL_MEDIA_CONTENT));

    let social = llm_step(
        options,
        CREATE_SOCIAL_MEDIA_CONTENT,
        SOCIAL_PROMPT,
        "Create the social media content from the information above.",
        0.7,
    )
    .requires(&after_strategy)
    .default_var(MARKETING_CHANNELS, DEFAULT_SOCIAL_CHANNELS.to_vec())
    .default_var(TONE, DEFAULT_TONE)
    .writes(SOCIAL_MEDIA_CONTENT, Shape::Object)
    .with_retry(retry.clone())
    .then(Next::step(CREATE_MARKETING_COPY));

    let copy = llm_step(
        options,
        CREATE_MARKETING_COPY,
        COPY_PROMPT,
        "Create the marketing copy from the information above.",
        0.6,
    )
    .requires(&after_strategy)
    .default_var(TONE, DEFAULT_TONE)
    .writes(MARKETING_COPY, Shape::Object)
    .with_retry(retry);

    let graph = StateGraph::new(GRAPH_NAME)
        .add_step(strategy)
        .add_step(seo)
        .add_step(social)
        .add_step(copy)
        .entry(CREATE_MARKETING_STRATEGY);
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
            fenced(&json!({"positioning": "Code review without the wait"})),
            fenced(&json!({"page_title": "Lintly | Instant code review"})),
            fenced(&json!({"posts": {"LinkedIn": ["Launch day!"]}})),
            fenced(&json!({"tagline": "Review code at the speed of thought"})),
        ]
    }

    #[tokio::test]
    async fn test_happy_path_and_step_defaults() {
        let mock = scripted(replies());
        let state = MarketingRequest::new(json!({"name": "Lintly"}), "Engineering managers")
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
        assert_eq!(mock.calls(), 4);

        let requests = mock.requests();
        let strategy = &requests[0].messages[0].content;
        assert!(strategy.contains("- Content Marketing"));
        assert!(strategy.contains("- Drive product sign-ups"));
        let social = &requests[2].messages[0].content;
        assert!(social.contains("- Instagram"));
        assert!(!social.contains("- Email"));
        assert!(requests[3].messages[0].content.contains("Tone: Professional but approachable"));

        let temps: Vec<f64> = requests.iter().map(|r| r.config.temperature).collect();
        assert_eq!(temps, [0.5, 0.5, 0.7, 0.6]);
    }

    #[tokio::test]
    async fn test_caller_tone_and_channels() {
        let mock = scripted(replies());
        let state = MarketingRequest::new(json!({"name": "Lintly"}), json!(["CTOs", "Tech leads"]))
            .with_channels(["Hacker News"])
            .with_tone("Playful")
            .to_state()
            .unwrap();

        build(&PipelineOptions::default())
            .unwrap()
            .invoke(&ctx(mock.clone()), state)
            .await;

        let requests = mock.requests();
        assert!(requests[0].messages[0].content.contains("- CTOs\n- Tech leads"));
        assert!(requests[2].messages[0].content.contains("- Hacker News"));
        assert!(requests[1].messages[0].content.contains("Tone: Playful"));
    }

    #[tokio::test]
    async fn test_temperature_override() {
        let mock = scripted(replies());
        let options = PipelineOptions::default().with_temperature(0.0);
        build(&options)
            .unwrap()
            .invoke(
                &ctx(mock.clone()),
                WorkflowState::new()
                    .input(PRODUCT, json!({"name": "Lintly"}))
                    .input(TARGET_AUDIENCE, "SREs"),
            )
            .await;
        assert!(mock.requests().iter().all(|r| r.config.temperature == 0.0));
    }

    #[tokio::test]
    async fn test_failure_midway_keeps_earlier_outputs() {
        let mock = scripted(vec![
            fenced(&json!({"positioning": "Fast"})),
            "SEO? Sure, here are my thoughts.".into(),
            "Still thinking.".into(),
        ]);
        let state = MarketingRequest::new(json!({"name": "Lintly"}), "Developers")
            .to_state()
            .unwrap();

        let out = build(&PipelineOptions::default())
            .unwrap()
            .invoke_traced(&ctx(mock.clone()), state, Default::default())
            .await;

        assert_eq!(out.trace, [CREATE_MARKETING_STRATEGY, CREATE_SEO_CONTENT]);
        assert_eq!(
            out.error(),
            Some("failed to parse create_seo_content output: malformed JSON")
        );
        assert!(out.state.contains(MARKETING_STRATEGY));
        assert!(!out.state.contains(SEO_CONTENT));
        assert_eq!(mock.calls(), 3);
    }
}
