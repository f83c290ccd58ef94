//! Transport-level retry with exponential backoff and jitter.
//!
//! Distinct from the re-prompt in [`retry`](crate::retry): backoff repeats
//! the same request after rate limits and server errors, while a re-prompt
//! sends a new request after an unparseable reply.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FlowError, Result};

/// Backoff policy for transient HTTP failures (429, 5xx, connection errors).
///
/// # Example
///
/// ```
/// use forge_agents::backend::BackoffConfig;
///
/// assert_eq!(BackoffConfig::none().max_retries, 0);
/// assert_eq!(BackoffConfig::standard().max_retries, 3);
/// assert_eq!(BackoffConfig::preset("interactive").unwrap().max_retries, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Transport retries after the first attempt.
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Growth factor: initial, initial * m, initial * m^2, ...
    pub multiplier: f64,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    pub jitter: JitterStrategy,
    pub retryable_statuses: Vec<u16>,
    /// Prefer the provider's `Retry-After` over the computed delay.
    pub respect_retry_after: bool,
}

/// Jitter applied to the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// Cloud API defaults: 3 retries, 1s initial, 2x, 60s cap, full jitter.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Someone is waiting: 2 retries, 500ms initial, 10s cap.
    pub fn interactive() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            ..Self::standard()
        }
    }

    /// Look up a preset by name: `none`, `standard`, or `interactive`.
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(Self::none()),
            "standard" => Ok(Self::standard()),
            "interactive" => Ok(Self::interactive()),
            other => Err(FlowError::InvalidConfig(format!(
                "unknown backoff preset '{other}'"
            ))),
        }
    }

    /// Delay before retry number `attempt + 1` (0-indexed), jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::standard()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(max_delay: Duration) -> BackoffConfig {
        BackoffConfig {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay,
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429],
            respect_retry_after: false,
        }
    }

    #[test]
    fn test_backoff_delay_exponential() {
        let config = exact(Duration::from_secs(60));
        let delays: Vec<_> = (0..4).map(|a| config.delay_for_attempt(a)).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 8].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn test_backoff_delay_capped_at_max() {
        let config = exact(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_jitter_in_range() {
        let full = BackoffConfig {
            jitter: JitterStrategy::Full,
            ..exact(Duration::from_secs(60))
        };
        let equal = BackoffConfig {
            jitter: JitterStrategy::Equal,
            ..exact(Duration::from_secs(60))
        };
        for _ in 0..100 {
            assert!(full.delay_for_attempt(1) <= Duration::from_secs(2));
            let d = equal.delay_for_attempt(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_unknown_preset() {
        let err = BackoffConfig::preset("turbo").unwrap_err();
        assert!(err.to_string().contains("turbo"));
    }
}
