//! Model-service abstraction.
//!
//! The [`Backend`] trait is the single seam between workflow steps and a
//! chat-completion service. Steps build a provider-agnostic [`LlmRequest`]
//! (ordered role-tagged messages plus model and sampling settings) and get
//! back the reply text in an [`LlmResponse`].
//!
//! ```text
//! LlmStep ──► LlmRequest ──► with_backoff() ──► Backend::complete() ──► LlmResponse
//!                                                     │
//!                                      ┌──────────────┴──────────────┐
//!                                OpenAiBackend                  MockBackend
//!                            /v1/chat/completions            scripted replies
//! ```

pub mod backoff;
pub mod mock;
pub mod openai;

pub use backoff::BackoffConfig;
pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiBackend;

use crate::error::{FlowError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked before each transport retry with
/// `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// Sampling settings sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// 0.0 is deterministic, higher is more varied.
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response format.
    pub json_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            json_mode: false,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }
}

/// A provider-agnostic chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// Model identifier, e.g. `"gpt-4o"`.
    pub model: String,
    /// Ordered conversation, usually one system and one human message.
    pub messages: Vec<ChatMessage>,
    pub config: LlmConfig,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, config: LlmConfig) -> Self {
        Self {
            model: model.into(),
            messages,
            config,
        }
    }

    /// Content of the first system message, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }
}

/// One message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A normalized model reply.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// HTTP status code, for diagnostics.
    pub status: u16,
    /// Provider metadata (token usage, model, request id) as raw JSON.
    pub metadata: Option<serde_json::Value>,
}

/// A chat-completion service.
///
/// Object-safe; held as `Arc<dyn Backend>` inside
/// [`ExecCtx`](crate::exec_ctx::ExecCtx) and shared by every concurrent run.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute one non-streaming completion.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Whether a transport error should be retried under `config`.
///
/// Retryable: HTTP statuses listed in `config.retryable_statuses`, and
/// connection-level [`FlowError::Request`] failures.
pub fn is_retryable(error: &FlowError, config: &BackoffConfig) -> bool {
    match error {
        FlowError::HttpError { status, .. } => config.retryable_statuses.contains(status),
        FlowError::Request(_) => true,
        _ => false,
    }
}

/// Run `backend.complete()` with transport retry and exponential backoff.
///
/// Run cancellation is not consulted here: a step's model call finishes its
/// whole retry sequence, and the graph honors the flag at the next step
/// boundary. Only the per-call timeout cuts a sequence short.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
    mut on_retry: RetryCallback<'_>,
) -> Result<LlmResponse> {
    let mut attempt = 0;
    loop {
        let err = match backend.complete(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        if attempt >= config.max_retries || !is_retryable(&err, config) {
            return Err(err);
        }

        let delay = match &err {
            FlowError::HttpError {
                retry_after: Some(ra),
                ..
            } if config.respect_retry_after => *ra,
            _ => config.delay_for_attempt(attempt),
        };
        attempt += 1;

        if let Some(ref mut cb) = on_retry {
            cb(attempt, delay, &err.to_string());
        }
        tokio::time::sleep(delay).await;
    }
}
