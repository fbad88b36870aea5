//! Retry budget and backoff.
//!
//! A failed attempt is retried only while both the per-step and the
//! job-wide budgets have room. Delays grow as `base^attempt` seconds and
//! are capped, so the default schedule is 2, 4, 8, 16, 30, 30, ...

use crate::core::ErrorKind;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base ^ attempt
    #[default]
    Exponential,
    /// delay = base * attempt
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy to spread retries of many jobs hitting the same provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Computes the delay before a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Growth base in seconds.
    pub base_seconds: u64,
    /// Ceiling on any single delay, in seconds.
    pub cap_seconds: u64,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_seconds: 2,
            cap_seconds: 30,
            strategy: BackoffStrategy::Exponential,
            jitter: JitterStrategy::None,
        }
    }
}

impl BackoffPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cap.
    #[must_use]
    pub fn with_cap_seconds(mut self, cap: u64) -> Self {
        self.cap_seconds = cap;
        self
    }

    /// Sets the base.
    #[must_use]
    pub fn with_base_seconds(mut self, base: u64) -> Self {
        self.base_seconds = base;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (starting at 1).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_seconds;
        let cap = self.cap_seconds;

        let seconds = match self.strategy {
            BackoffStrategy::Exponential => base.saturating_pow(attempt).min(cap),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt)).min(cap),
            BackoffStrategy::Constant => base.min(cap),
        };
        let millis = seconds.saturating_mul(1000);

        let jittered = match self.jitter {
            JitterStrategy::None => millis,
            JitterStrategy::Full => {
                if millis == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=millis)
                }
            }
            JitterStrategy::Equal => {
                let half = millis / 2;
                if half == 0 {
                    millis
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Why a failing step will not be retried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exhaustion {
    /// The step used `max_retries_per_step` retries.
    StepLimit,
    /// The job used `max_total_retries` across all steps.
    JobLimit,
}

impl std::fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StepLimit => write!(f, "per-step retry limit reached"),
            Self::JobLimit => write!(f, "job-wide retry limit reached"),
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`; this will be retry number `attempt`.
    Retry {
        /// Retry number, starting at 1.
        attempt: u32,
        /// Delay before the retry.
        delay: Duration,
    },
    /// No more retries; escalate to fallback or failure without sleeping.
    Exhausted(Exhaustion),
}

/// Per-step and job-wide retry ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    /// Retries allowed for one step before escalation.
    pub max_retries_per_step: u32,
    /// Retries allowed across the whole job.
    pub max_total_retries: u32,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_retries_per_step: 3,
            max_total_retries: 10,
        }
    }
}

impl RetryBudget {
    /// Decides what to do after a failed attempt.
    ///
    /// `step_retries` is the number of retries the step already used and
    /// `job_total_retries` the job-wide failure count including the failure
    /// being handled. The kind is accepted so that per-kind policies can be
    /// layered on; the default policy treats every kind alike.
    #[must_use]
    pub fn decide(
        &self,
        step_retries: u32,
        job_total_retries: u32,
        _kind: ErrorKind,
        backoff: &BackoffPolicy,
    ) -> RetryDecision {
        if step_retries >= self.max_retries_per_step {
            return RetryDecision::Exhausted(Exhaustion::StepLimit);
        }
        if job_total_retries >= self.max_total_retries {
            return RetryDecision::Exhausted(Exhaustion::JobLimit);
        }
        let attempt = step_retries + 1;
        RetryDecision::Retry {
            attempt,
            delay: backoff.delay_for(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(d: Duration) -> u64 {
        d.as_secs()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(BackoffStrategy::default(), BackoffStrategy::Exponential);
        assert_eq!(JitterStrategy::default(), JitterStrategy::None);
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_seconds, 2);
        assert_eq!(policy.cap_seconds, 30);
        let budget = RetryBudget::default();
        assert_eq!(budget.max_retries_per_step, 3);
        assert_eq!(budget.max_total_retries, 10);
    }

    #[test]
    fn test_exponential_schedule_is_capped() {
        let policy = BackoffPolicy::default();
        let schedule: Vec<u64> = (1..=7).map(|a| secs(policy.delay_for(a))).collect();
        assert_eq!(schedule, vec![2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_exponential_does_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(secs(policy.delay_for(200)), 30);
    }

    #[test]
    fn test_linear_and_constant() {
        let linear = BackoffPolicy::new().with_strategy(BackoffStrategy::Linear);
        assert_eq!(secs(linear.delay_for(1)), 2);
        assert_eq!(secs(linear.delay_for(3)), 6);

        let constant = BackoffPolicy::new()
            .with_strategy(BackoffStrategy::Constant)
            .with_base_seconds(5);
        assert_eq!(secs(constant.delay_for(1)), 5);
        assert_eq!(secs(constant.delay_for(9)), 5);
    }

    #[test]
    fn test_full_jitter_stays_within_delay() {
        let policy = BackoffPolicy::new().with_jitter(JitterStrategy::Full);
        for _ in 0..20 {
            assert!(policy.delay_for(2) <= Duration::from_secs(4));
        }
    }

    #[test]
    fn test_equal_jitter_keeps_half() {
        let policy = BackoffPolicy::new().with_jitter(JitterStrategy::Equal);
        for _ in 0..20 {
            let d = policy.delay_for(3);
            assert!(d >= Duration::from_secs(4) && d <= Duration::from_secs(8));
        }
    }

    #[test]
    fn test_budget_retries_until_step_limit() {
        let budget = RetryBudget::default();
        let backoff = BackoffPolicy::default();
        let kind = ErrorKind::NetworkOrTimeout;

        let delays: Vec<u64> = (0..3)
            .map(|retries| match budget.decide(retries, retries + 1, kind, &backoff) {
                RetryDecision::Retry { delay, .. } => secs(delay),
                RetryDecision::Exhausted(e) => panic!("unexpected {e}"),
            })
            .collect();
        assert_eq!(delays, vec![2, 4, 8]);

        assert_eq!(
            budget.decide(3, 4, kind, &backoff),
            RetryDecision::Exhausted(Exhaustion::StepLimit)
        );
    }

    #[test]
    fn test_budget_job_limit_escalates_immediately() {
        let budget = RetryBudget {
            max_retries_per_step: 3,
            max_total_retries: 2,
        };
        let backoff = BackoffPolicy::default();
        assert!(matches!(
            budget.decide(0, 1, ErrorKind::Unknown, &backoff),
            RetryDecision::Retry { attempt: 1, .. }
        ));
        assert_eq!(
            budget.decide(1, 2, ErrorKind::Unknown, &backoff),
            RetryDecision::Exhausted(Exhaustion::JobLimit)
        );
    }

    #[test]
    fn test_zero_step_retries_means_no_retry() {
        let budget = RetryBudget {
            max_retries_per_step: 0,
            max_total_retries: 10,
        };
        assert_eq!(
            budget.decide(0, 1, ErrorKind::Unknown, &BackoffPolicy::default()),
            RetryDecision::Exhausted(Exhaustion::StepLimit)
        );
    }
}
