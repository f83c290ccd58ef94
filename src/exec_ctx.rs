//! Execution context shared by every run of every graph.
//!
//! [`ExecCtx`] carries the HTTP client, model backend, endpoint, transport
//! backoff, per-call timeout, cancellation flag, and optional event handler.
//! Build it once and pass `&ExecCtx` to any number of concurrent runs; it
//! holds no per-run state.

use crate::backend::{Backend, BackoffConfig, OpenAiBackend};
use crate::error::{FlowError, Result};
use crate::events::EventHandler;
use reqwest::Client;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

/// Default endpoint for the OpenAI backend.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Shared runtime environment for step execution.
///
/// # Example
///
/// ```
/// use forge_agents::backend::MockBackend;
/// use forge_agents::ExecCtx;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let ctx = ExecCtx::builder("http://localhost:8000/v1")
///     .backend(Arc::new(MockBackend::fixed("[]")))
///     .call_timeout(Duration::from_secs(30))
///     .build()
///     .unwrap();
/// assert_eq!(ctx.base_url, "http://localhost:8000");
/// ```
pub struct ExecCtx {
    pub client: Client,
    /// Provider base URL with any `/v1...` suffix stripped.
    pub base_url: String,
    /// Model backend. Default: [`OpenAiBackend`] without a key.
    pub backend: Arc<dyn Backend>,
    /// Transport retry. Default: [`BackoffConfig::none()`].
    pub backoff: BackoffConfig,
    /// Upper bound on one model call, backoff included. `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// Checked by graphs between steps.
    pub cancellation: Option<Arc<AtomicBool>>,
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtx {
    pub fn builder(base_url: impl Into<String>) -> ExecCtxBuilder {
        ExecCtxBuilder {
            client: None,
            base_url: base_url.into(),
            backend: None,
            backoff: None,
            call_timeout: None,
            http_timeout: None,
            cancellation: None,
            event_handler: None,
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("backoff", &self.backoff)
            .field("call_timeout", &self.call_timeout)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`ExecCtx`].
pub struct ExecCtxBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    backoff: Option<BackoffConfig>,
    call_timeout: Option<Duration>,
    http_timeout: Option<Duration>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtxBuilder {
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use [`OpenAiBackend`] with `Authorization: Bearer {api_key}`.
    pub fn openai_with_key(mut self, api_key: impl Into<String>) -> Self {
        self.backend = Some(Arc::new(OpenAiBackend::new().with_api_key(api_key)));
        self
    }

    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Abort any single model call that runs longer than `timeout`.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Socket-level timeout of the built HTTP client. Default: 60 seconds.
    /// Ignored when a custom client is supplied.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn cancellation(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancellation = cancel;
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<ExecCtx> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.http_timeout.unwrap_or(Duration::from_secs(60)))
                .build()?,
        };
        Ok(ExecCtx {
            client,
            base_url: normalize_base_url(&self.base_url),
            backend: self
                .backend
                .unwrap_or_else(|| Arc::new(OpenAiBackend::new())),
            backoff: self.backoff.unwrap_or_else(BackoffConfig::none),
            call_timeout: self.call_timeout,
            cancellation: self.cancellation,
            event_handler: self.event_handler,
        })
    }
}

/// Strip provider path suffixes so backends can append their own.
/// `https://api.openai.com/v1` becomes `https://api.openai.com`.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    for suffix in ["/v1/chat/completions", "/v1/chat", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
