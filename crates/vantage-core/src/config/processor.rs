use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, VantageError};

/// What to do with an event that cannot be decoded or applied as written
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MalformedEventPolicy {
    /// Stop at the event and keep the cursor before it
    #[default]
    Block,
    /// Dead-letter the event and move the cursor past it
    SkipAndAdvance,
}

/// Delay schedule between retries of a failing event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed { delay_ms: u64 },

    /// Exponential: delay * 2^attempt (capped at max)
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential {
            initial_ms: 100,
            max_ms: 30_000,
        }
    }
}

impl BackoffStrategy {
    /// Calculate delay for a given retry attempt (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffStrategy::Exponential { initial_ms, max_ms } => {
                let multiplier = 2u64.saturating_pow(attempt);
                Duration::from_millis(initial_ms.saturating_mul(multiplier).min(*max_ms))
            }
        }
    }
}

/// Configuration for the work-log processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Maximum number of work-log units fetched per batch
    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Poll interval when caught up (milliseconds)
    /// Default: 1000ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Units younger than this are left for a later poll, giving the
    /// repository time to settle after the write it logged.
    /// Default: 0 (no delay)
    #[serde(default)]
    pub min_event_age_secs: u64,

    #[serde(default)]
    pub malformed_policy: MalformedEventPolicy,

    #[serde(default)]
    pub backoff: BackoffStrategy,
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            min_event_age_secs: 0,
            malformed_policy: MalformedEventPolicy::default(),
            backoff: BackoffStrategy::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_min_event_age_secs(mut self, secs: u64) -> Self {
        self.min_event_age_secs = secs;
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedEventPolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `min_event_age_secs` as a signed delta, rejected when chrono cannot represent it.
    pub fn min_event_age(&self) -> Result<TimeDelta> {
        i64::try_from(self.min_event_age_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                VantageError::Config(format!(
                    "min_event_age_secs {} is out of range",
                    self.min_event_age_secs
                ))
            })
    }

    /// Reject settings the processor cannot make progress with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(VantageError::Config("batch_size must be at least 1".into()));
        }
        self.min_event_age()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::Exponential {
            initial_ms: 100,
            max_ms: 1000,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_millis(1000));
        assert_eq!(backoff.delay(60), Duration::from_millis(1000));
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: ProcessorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.malformed_policy, MalformedEventPolicy::Block);
        assert_eq!(cfg.min_event_age_secs, 0);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let cfg = ProcessorConfig::default().with_batch_size(0);
        assert!(matches!(cfg.validate(), Err(VantageError::Config(_))));
    }

    #[test]
    fn test_min_event_age_range() {
        let cfg = ProcessorConfig::default().with_min_event_age_secs(3600);
        assert_eq!(cfg.min_event_age().unwrap(), TimeDelta::hours(1));

        for secs in [1u64 << 62, u64::MAX] {
            let cfg = ProcessorConfig::default().with_min_event_age_secs(secs);
            assert!(matches!(cfg.min_event_age(), Err(VantageError::Config(_))));
            assert!(cfg.validate().is_err());
        }

        let cfg: ProcessorConfig =
            serde_json::from_str(r#"{"min_event_age_secs": 18446744073709551615}"#).unwrap();
        assert!(cfg.validate().is_err());
    }
}
