//! Executor configuration.

use crate::errors::ResumeflowError;
use crate::pipeline::{BackoffPolicy, BackoffStrategy, JitterStrategy, RetryBudget};
use serde::{Deserialize, Serialize};

/// Retry, backoff and review settings shared by every worker in a process.
///
/// Build it once and hand it to executors behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Retries allowed for one step before fallback or failure.
    #[serde(default = "default_max_retries_per_step")]
    pub max_retries_per_step: u32,
    /// Retries allowed across the whole job.
    #[serde(default = "default_max_total_retries")]
    pub max_total_retries: u32,
    /// Ceiling on a single backoff delay, in seconds.
    #[serde(default = "default_backoff_cap_seconds")]
    pub backoff_cap_seconds: u64,
    /// Base of the exponential backoff, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u64,
    /// Jitter applied to backoff delays.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Error count at which a job is flagged for human review.
    #[serde(default = "default_error_count_degraded_threshold")]
    pub error_count_degraded_threshold: usize,
    /// Reload the previous step's checkpoint before each retry.
    #[serde(default = "default_restore_checkpoint_on_retry")]
    pub restore_checkpoint_on_retry: bool,
}

fn default_max_retries_per_step() -> u32 {
    3
}

fn default_max_total_retries() -> u32 {
    10
}

fn default_backoff_cap_seconds() -> u64 {
    30
}

fn default_backoff_base() -> u64 {
    2
}

fn default_error_count_degraded_threshold() -> usize {
    5
}

fn default_restore_checkpoint_on_retry() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries_per_step: default_max_retries_per_step(),
            max_total_retries: default_max_total_retries(),
            backoff_cap_seconds: default_backoff_cap_seconds(),
            backoff_base: default_backoff_base(),
            jitter: JitterStrategy::None,
            error_count_degraded_threshold: default_error_count_degraded_threshold(),
            restore_checkpoint_on_retry: default_restore_checkpoint_on_retry(),
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values fail
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ResumeflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeflowError::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ResumeflowError> {
        if self.max_total_retries == 0 {
            return Err(ResumeflowError::Config(
                "max_total_retries must be at least 1".to_string(),
            ));
        }
        if self.backoff_cap_seconds == 0 {
            return Err(ResumeflowError::Config(
                "backoff_cap_seconds must be at least 1".to_string(),
            ));
        }
        if self.backoff_base == 0 {
            return Err(ResumeflowError::Config(
                "backoff_base must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the per-step retry limit.
    #[must_use]
    pub fn with_max_retries_per_step(mut self, n: u32) -> Self {
        self.max_retries_per_step = n;
        self
    }

    /// Sets the job-wide retry limit.
    #[must_use]
    pub fn with_max_total_retries(mut self, n: u32) -> Self {
        self.max_total_retries = n;
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn with_backoff_cap_seconds(mut self, seconds: u64) -> Self {
        self.backoff_cap_seconds = seconds;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub fn with_backoff_base(mut self, seconds: u64) -> Self {
        self.backoff_base = seconds;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the review threshold.
    #[must_use]
    pub fn with_error_count_degraded_threshold(mut self, n: usize) -> Self {
        self.error_count_degraded_threshold = n;
        self
    }

    /// Enables or disables restoring the previous checkpoint before a retry.
    #[must_use]
    pub fn with_restore_checkpoint_on_retry(mut self, enabled: bool) -> Self {
        self.restore_checkpoint_on_retry = enabled;
        self
    }

    /// The backoff policy these settings describe.
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_seconds: self.backoff_base,
            cap_seconds: self.backoff_cap_seconds,
            strategy: BackoffStrategy::Exponential,
            jitter: self.jitter,
        }
    }

    /// The retry budget these settings describe.
    #[must_use]
    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget {
            max_retries_per_step: self.max_retries_per_step,
            max_total_retries: self.max_total_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_retries_per_step, 3);
        assert_eq!(config.max_total_retries, 10);
        assert_eq!(config.backoff_cap_seconds, 30);
        assert_eq!(config.error_count_degraded_threshold, 5);
        assert_eq!(config.backoff_base, 2);
        assert_eq!(config.jitter, JitterStrategy::None);
        assert!(config.restore_checkpoint_on_retry);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ExecutorConfig::from_json(r#"{"max_retries_per_step": 5, "jitter": "full"}"#).unwrap();
        assert_eq!(config.max_retries_per_step, 5);
        assert_eq!(config.jitter, JitterStrategy::Full);
        assert_eq!(config.max_total_retries, 10);
        assert_eq!(config.backoff_cap_seconds, 30);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(ExecutorConfig::from_json("{}").unwrap(), ExecutorConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(ExecutorConfig::new().with_max_total_retries(0).validate().is_err());
        assert!(ExecutorConfig::new().with_backoff_cap_seconds(0).validate().is_err());
        assert!(ExecutorConfig::new().with_backoff_base(0).validate().is_err());
        assert!(matches!(
            ExecutorConfig::from_json(r#"{"max_total_retries": 0}"#),
            Err(ResumeflowError::Config(_))
        ));
        assert!(matches!(
            ExecutorConfig::from_json("not json"),
            Err(ResumeflowError::Serialization(_))
        ));
    }

    #[test]
    fn test_derived_policies() {
        let config = ExecutorConfig::new()
            .with_max_retries_per_step(2)
            .with_backoff_cap_seconds(5);
        assert_eq!(config.retry_budget().max_retries_per_step, 2);
        let backoff = config.backoff_policy();
        assert_eq!(backoff.delay_for(1).as_secs(), 2);
        assert_eq!(backoff.delay_for(3).as_secs(), 5);
    }
}
