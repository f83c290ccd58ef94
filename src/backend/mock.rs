//! Scripted backend for tests and offline demos.
//!
//! [`MockBackend`] replays a list of [`MockReply`] values in order, cycling
//! when exhausted, or computes each reply from the request with a closure.
//! Every request is recorded so tests can assert on prompts and call counts.
//!
//! # Example
//!
//! ```
//! use forge_agents::backend::MockBackend;
//!
//! let mock = MockBackend::new(vec!["```json\n[]\n```".to_string()]);
//! assert_eq!(mock.calls(), 0);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::{FlowError, Result};

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Successful reply with this text.
    Text(String),
    /// HTTP error with status and body.
    Status(u16, String),
    /// Non-HTTP transport failure with this message.
    Fail(String),
}

type Responder = Arc<dyn Fn(&LlmRequest) -> MockReply + Send + Sync>;

enum Script {
    Cycle(Vec<MockReply>),
    Func(Responder),
}

/// A backend that never touches the network.
pub struct MockBackend {
    script: Script,
    index: AtomicUsize,
    delay: Option<Duration>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let script = match &self.script {
            Script::Cycle(replies) => format!("{} replies", replies.len()),
            Script::Func(_) => "fn".to_string(),
        };
        f.debug_struct("MockBackend")
            .field("script", &script)
            .field("calls", &self.calls())
            .field("delay", &self.delay)
            .finish()
    }
}

impl MockBackend {
    /// Successful text replies, returned in order and cycled.
    pub fn new(responses: Vec<String>) -> Self {
        Self::from_replies(responses.into_iter().map(MockReply::Text).collect())
    }

    /// Always reply with the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Always fail with a transport error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::from_replies(vec![MockReply::Fail(message.into())])
    }

    /// Arbitrary scripted outcomes, returned in order and cycled. An empty
    /// script replies with empty text.
    pub fn from_replies(replies: Vec<MockReply>) -> Self {
        Self::with_script(Script::Cycle(replies))
    }

    /// Compute each reply from the incoming request.
    pub fn from_fn(f: impl Fn(&LlmRequest) -> MockReply + Send + Sync + 'static) -> Self {
        Self::with_script(Script::Func(Arc::new(f)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            index: AtomicUsize::new(0),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of completed or in-flight calls so far.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Copies of every request received, in arrival order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn next_reply(&self, request: &LlmRequest) -> MockReply {
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Cycle(replies) if replies.is_empty() => MockReply::Text(String::new()),
            Script::Cycle(replies) => replies[idx % replies.len()].clone(),
            Script::Func(f) => f(request),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        match self.requests.lock() {
            Ok(mut log) => log.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        let reply = self.next_reply(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            MockReply::Text(text) => Ok(LlmResponse {
                text,
                status: 200,
                metadata: None,
            }),
            MockReply::Status(status, body) => Err(FlowError::HttpError {
                status,
                body,
                retry_after: None,
            }),
            MockReply::Fail(message) => Err(FlowError::Other(message)),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
