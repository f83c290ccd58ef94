use std::time::Duration;
use thiserror::Error;

/// Errors produced by the engine outside of a running workflow.
///
/// A running graph never returns these to the caller: every failure inside a
/// step is converted into a [`StepFailure`] and written to the state's
/// `error` field. `FlowError` surfaces only from construction-time
/// operations (graph compilation, registry lookups, config parsing) and from
/// the model-service transport, where the step boundary catches it.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Low-level HTTP transport failure (connection refused, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 401, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// The in-flight model call exceeded the caller-supplied timeout.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled via the cancellation flag.
    #[error("run was cancelled")]
    Cancelled,

    /// Invalid configuration detected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        FlowError::Other(err.to_string())
    }
}

impl From<toml::de::Error> for FlowError {
    fn from(err: toml::de::Error) -> Self {
        FlowError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

/// Why a step ended the run.
///
/// The `Display` text is what the step writes into the state's `error`
/// field, so messages are phrased for the caller, not for a developer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepFailure {
    /// A required input field was missing, null, or empty.
    #[error("missing required field '{field}'")]
    Precondition {
        /// Name of the missing state field.
        field: String,
    },

    /// The model reply could not be parsed, even after the permitted re-prompt.
    #[error("failed to parse {step} output: {reason}")]
    Extraction {
        /// Step that requested the extraction.
        step: String,
        /// Parse failure reason from the extractor.
        reason: String,
        /// Last raw model reply, kept for diagnostics.
        raw: String,
    },

    /// The model-service call itself failed; the message is preserved verbatim.
    #[error("{0}")]
    Transport(String),

    /// The in-flight model call was aborted by the per-call timeout.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// A step's own post-extraction check rejected the parsed value.
    #[error("{0}")]
    Rejected(String),

    /// The run executed more steps than its budget allows.
    #[error("step budget exceeded ({limit} steps)")]
    StepBudget {
        /// Configured maximum number of step executions.
        limit: usize,
    },

    /// The caller cancelled the run between step boundaries.
    #[error("run canceled")]
    Canceled,
}

impl StepFailure {
    /// Short, stable label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            StepFailure::Precondition { .. } => "precondition",
            StepFailure::Extraction { .. } => "extraction",
            StepFailure::Transport(_) => "transport",
            StepFailure::Timeout(_) => "timeout",
            StepFailure::Rejected(_) => "rejected",
            StepFailure::StepBudget { .. } => "step_budget",
            StepFailure::Canceled => "canceled",
        }
    }
}

impl From<FlowError> for StepFailure {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::Timeout(d) => StepFailure::Timeout(d),
            FlowError::Cancelled => StepFailure::Canceled,
            other => StepFailure::Transport(other.to_string()),
        }
    }
}
