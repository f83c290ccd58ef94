//! One structured model call: render prompts, call the backend, extract JSON.
//!
//! [`StructuredCall`] is the model-facing half of an [`LlmStep`](crate::step::LlmStep).
//! It owns the prompt templates and sampling settings, applies the per-call
//! timeout and transport backoff from the [`ExecCtx`], and re-prompts once
//! when the reply is not parseable.

use crate::{
    backend::{self, ChatMessage, LlmConfig, LlmRequest, LlmResponse},
    error::{FlowError, Result, StepFailure},
    events::{emit, Event},
    exec_ctx::ExecCtx,
    prompt,
    retry::{self, Attempt, RetryConfig},
};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Model used when a step does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Prompt templates plus model settings for one step.
///
/// # Example
///
/// ```
/// use forge_agents::llm_call::StructuredCall;
/// use forge_agents::retry::{RetryConfig, ARRAY_INSTRUCTION};
///
/// let call = StructuredCall::new(
///     "generate_ideas",
///     "Propose {num_ideas} SaaS ideas for {market_segment}.",
///     "Generate SaaS ideas based on the provided parameters.",
/// )
/// .with_temperature(0.7)
/// .with_retry(RetryConfig::once(ARRAY_INSTRUCTION))
/// .with_retry_var("num_ideas", 3);
///
/// assert_eq!(call.model(), "gpt-4o");
/// ```
#[derive(Debug, Clone)]
pub struct StructuredCall {
    step: String,
    model: String,
    system_template: String,
    human_message: String,
    config: LlmConfig,
    retry: RetryConfig,
    retry_vars: Map<String, Value>,
}

impl StructuredCall {
    pub fn new(
        step: impl Into<String>,
        system_template: impl Into<String>,
        human_message: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            model: DEFAULT_MODEL.to_string(),
            system_template: system_template.into(),
            human_message: human_message.into(),
            config: LlmConfig::default(),
            retry: RetryConfig::default(),
            retry_vars: Map::new(),
        }
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_config(mut self, config: LlmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override a template variable on the re-prompt only, e.g. asking for
    /// fewer items the second time.
    pub fn with_retry_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.retry_vars.insert(key.into(), value.into());
        self
    }

    /// The request for `attempt`, with the re-prompt instruction and
    /// overrides applied when it is a re-prompt.
    pub fn build_request(&self, vars: &Map<String, Value>, attempt: Attempt) -> LlmRequest {
        let system = if attempt.is_reprompt() {
            let mut amended = vars.clone();
            amended.extend(self.retry_vars.clone());
            self.retry.amend(&prompt::render(&self.system_template, &amended))
        } else {
            prompt::render(&self.system_template, vars)
        };

        LlmRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(system),
                ChatMessage::human(self.human_message.clone()),
            ],
            self.config.clone(),
        )
    }

    /// Call the model with `vars` and return the extracted JSON value.
    pub async fn invoke(&self, ctx: &ExecCtx, vars: &Map<String, Value>) -> std::result::Result<Value, StepFailure> {
        retry::with_reprompt(&self.retry, &self.step, |attempt| {
            if attempt.is_reprompt() {
                info!(step = %self.step, attempt = attempt.index, "re-prompting for valid JSON");
                emit(
                    &ctx.event_handler,
                    Event::RetryStart {
                        step: self.step.clone(),
                        attempt: attempt.index,
                    },
                );
            }
            let request = self.build_request(vars, attempt);
            async move {
                call_model(ctx, &self.step, &request)
                    .await
                    .map(|resp| resp.text)
                    .map_err(StepFailure::from)
            }
        })
        .await
    }
}

/// One backend round-trip with transport backoff and the context's
/// per-call timeout.
pub async fn call_model(ctx: &ExecCtx, step: &str, request: &LlmRequest) -> Result<LlmResponse> {
    debug!(
        step,
        model = %request.model,
        backend = ctx.backend.name(),
        temperature = request.config.temperature,
        "calling model"
    );

    let mut on_retry = |attempt: u32, delay: Duration, reason: &str| {
        warn!(step, attempt, delay_ms = delay.as_millis() as u64, reason, "transport retry");
        emit(
            &ctx.event_handler,
            Event::TransportRetry {
                step: step.to_string(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                reason: reason.to_string(),
            },
        );
    };

    let call = backend::with_backoff(
        &ctx.backend,
        &ctx.client,
        &ctx.base_url,
        request,
        &ctx.backoff,
        Some(&mut on_retry),
    );

    match ctx.call_timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| FlowError::Timeout(limit))?,
        None => call.await,
    }
}
