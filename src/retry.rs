//! Bounded re-prompt on extraction failure.
//!
//! When a model reply cannot be turned into JSON, the step may ask the model
//! once more with an extra formatting instruction appended to its prompt.
//! The number of re-prompts is capped at [`MAX_REPROMPTS`], so a step calls
//! the model at most twice for structured output.
//!
//! Transport failures are never re-prompted here; they are the concern of
//! [`with_backoff`](crate::backend::with_backoff).

use std::future::Future;

use serde_json::Value;
use tracing::warn;

use crate::error::StepFailure;
use crate::output_parser::{self, ExtractionFailure};

/// Hard ceiling on re-prompts per step.
pub const MAX_REPROMPTS: u32 = 1;

/// Instruction appended when a step expects a list of objects.
pub const ARRAY_INSTRUCTION: &str = "Return your response as a valid JSON array of objects.";

/// Instruction appended when a step expects a single object.
pub const OBJECT_INSTRUCTION: &str = "Return your response as a valid JSON object.";

/// Re-prompt policy for one structured call.
///
/// ```
/// use forge_agents::retry::{RetryConfig, ARRAY_INSTRUCTION};
///
/// let config = RetryConfig::new(3, ARRAY_INSTRUCTION);
/// assert_eq!(config.max_retries, 1);
/// assert_eq!(config.max_attempts(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Re-prompts after the first call. Capped at [`MAX_REPROMPTS`].
    pub max_retries: u32,
    /// Text appended to the system prompt on a re-prompt.
    pub instruction: String,
}

impl RetryConfig {
    pub fn new(max_retries: u32, instruction: impl Into<String>) -> Self {
        Self {
            max_retries: max_retries.min(MAX_REPROMPTS),
            instruction: instruction.into(),
        }
    }

    /// One re-prompt with the given instruction.
    pub fn once(instruction: impl Into<String>) -> Self {
        Self::new(1, instruction)
    }

    /// No re-prompt: the first extraction failure is final.
    pub fn disabled() -> Self {
        Self::new(0, "")
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// `base` with the re-prompt instruction appended as its own paragraph.
    pub fn amend(&self, base: &str) -> String {
        if self.instruction.is_empty() {
            base.to_string()
        } else {
            format!("{}\n\n{}", base.trim_end(), self.instruction)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::once(OBJECT_INSTRUCTION)
    }
}

/// Position of a call within a re-prompt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// Zero for the first call.
    pub index: u32,
}

impl Attempt {
    pub fn is_reprompt(self) -> bool {
        self.index > 0
    }
}

/// Call the model and extract JSON, re-prompting on extraction failure.
///
/// `call` performs one model round-trip and returns the raw reply text. It
/// receives the [`Attempt`] so it can amend its prompt on a re-prompt.
/// Transport errors from `call` end the sequence immediately.
pub async fn with_reprompt<F, Fut>(
    config: &RetryConfig,
    step: &str,
    call: F,
) -> Result<Value, StepFailure>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<String, StepFailure>>,
{
    with_reprompt_using(config, step, output_parser::extract, call).await
}

/// [`with_reprompt`] with a caller-supplied parser, e.g. a typed
/// [`extract_as`](crate::output_parser::extract_as).
pub async fn with_reprompt_using<T, P, F, Fut>(
    config: &RetryConfig,
    step: &str,
    parse: P,
    mut call: F,
) -> Result<T, StepFailure>
where
    P: Fn(&str) -> Result<T, ExtractionFailure>,
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<String, StepFailure>>,
{
    let mut last_failure = None;

    for index in 0..config.max_attempts() {
        let raw = call(Attempt { index }).await?;
        match parse(&raw) {
            Ok(value) => return Ok(value),
            Err(failure) => {
                warn!(
                    step,
                    attempt = index + 1,
                    reason = %failure,
                    detail = failure.detail.as_deref().unwrap_or(""),
                    raw = %failure.raw_preview(200),
                    "could not extract JSON from model reply"
                );
                last_failure = Some(failure);
            }
        }
    }

    let (reason, raw) = match last_failure {
        Some(f) => (f.reason, f.raw_text),
        None => (output_parser::error::EMPTY_REPLY.to_string(), String::new()),
    };
    Err(StepFailure::Extraction {
        step: step.to_string(),
        reason,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retries_are_capped_at_one() {
        assert_eq!(RetryConfig::new(10, "x").max_retries, 1);
        assert_eq!(RetryConfig::disabled().max_attempts(), 1);
    }

    #[test]
    fn amend_appends_paragraph() {
        let config = RetryConfig::once(ARRAY_INSTRUCTION);
        assert_eq!(
            config.amend("Generate ideas.\n"),
            format!("Generate ideas.\n\n{ARRAY_INSTRUCTION}")
        );
        assert_eq!(RetryConfig::disabled().amend("same"), "same");
    }

    #[tokio::test]
    async fn first_success_makes_one_call() {
        let calls = AtomicU32::new(0);
        let value = with_reprompt(&RetryConfig::default(), "s", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, StepFailure>("{\"a\": 1}".to_string()) }
        })
        .await
        .unwrap();

        assert_eq!(value, json!({"a": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reprompt_then_success() {
        let seen = std::sync::Mutex::new(Vec::new());
        let value = with_reprompt(&RetryConfig::default(), "s", |attempt| {
            seen.lock().unwrap().push(attempt.is_reprompt());
            let reply = if attempt.is_reprompt() { "[1]" } else { "nope" };
            async move { Ok::<_, StepFailure>(reply.to_string()) }
        })
        .await
        .unwrap();

        assert_eq!(value, json!([1]));
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn two_failures_give_extraction_error() {
        let calls = AtomicU32::new(0);
        let err = with_reprompt(&RetryConfig::once(ARRAY_INSTRUCTION), "generate_ideas", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, StepFailure>("not json".to_string()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            err.to_string(),
            "failed to parse generate_ideas output: malformed JSON"
        );
        assert!(matches!(err, StepFailure::Extraction { ref raw, .. } if raw == "not json"));
    }

    #[tokio::test]
    async fn transport_error_is_not_reprompted() {
        let calls = AtomicU32::new(0);
        let err = with_reprompt(&RetryConfig::default(), "s", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(StepFailure::Transport("HTTP 500: boom".into())) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err, StepFailure::Transport("HTTP 500: boom".into()));
    }
}
