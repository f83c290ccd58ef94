//! Engine configuration file.
//!
//! ```toml
//! [model]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o"
//! http_timeout_secs = 60
//! call_timeout_ms = 45000
//!
//! [backoff]
//! preset = "standard"
//! max_retries = 5
//!
//! [engine]
//! max_steps = 25
//! ```
//!
//! Every key is optional. Credentials are not read from the file or the
//! environment; pass the API key to [`ExecCtxBuilder::openai_with_key`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    backend::BackoffConfig,
    error::{FlowError, Result},
    exec_ctx::{ExecCtx, ExecCtxBuilder, DEFAULT_BASE_URL},
    graph::DEFAULT_MAX_STEPS,
    llm_call::DEFAULT_MODEL,
    registry::PipelineOptions,
};

/// Top-level config, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub backoff: BackoffSection,
    #[serde(default)]
    pub engine: EngineSection,
}

/// `[model]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Socket timeout of the HTTP client.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Upper bound on one model call, transport retries included.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            http_timeout_secs: default_http_timeout_secs(),
            call_timeout_ms: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_http_timeout_secs() -> u64 {
    60
}

/// `[backoff]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSection {
    /// `none`, `standard`, or `interactive`.
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Overrides the preset's retry count.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            max_retries: None,
        }
    }
}

fn default_preset() -> String {
    "standard".into()
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FlowError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_steps == 0 {
            return Err(FlowError::InvalidConfig(
                "engine.max_steps must be at least 1".into(),
            ));
        }
        if self.model.model.trim().is_empty() {
            return Err(FlowError::InvalidConfig("model.model must not be empty".into()));
        }
        self.backoff_config().map(|_| ())
    }

    /// The `[backoff]` preset with its overrides applied.
    pub fn backoff_config(&self) -> Result<BackoffConfig> {
        let mut config = BackoffConfig::preset(&self.backoff.preset)?;
        if let Some(retries) = self.backoff.max_retries {
            config.max_retries = retries;
        }
        Ok(config)
    }

    /// An execution-context builder preloaded from this config. Add a
    /// backend or API key, then call `build()`.
    pub fn exec_ctx(&self) -> Result<ExecCtxBuilder> {
        let mut builder = ExecCtx::builder(&self.model.base_url)
            .http_timeout(Duration::from_secs(self.model.http_timeout_secs))
            .backoff(self.backoff_config()?);
        if let Some(ms) = self.model.call_timeout_ms {
            builder = builder.call_timeout(Duration::from_millis(ms));
        }
        Ok(builder)
    }

    /// Pipeline options carrying the configured model and step budget.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions::default()
            .with_model(self.model.model.clone())
            .with_max_steps(self.engine.max_steps)
    }
}
