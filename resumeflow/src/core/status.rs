//! Job status and error kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a job.
///
/// Transitions are monotonic: `Pending -> Processing -> {Done, Degraded, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, not yet picked up.
    #[default]
    Pending,
    /// A worker is driving the steps.
    Processing,
    /// Every step produced its real output.
    Done,
    /// A step produced no usable result; the job stopped.
    Error,
    /// Every step produced a result, at least one of them a fallback.
    Degraded,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

impl JobStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Degraded)
    }

    /// Returns true if the job produced output (possibly reduced fidelity).
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done | Self::Degraded)
    }

    /// Returns true if the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Processing, next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// Coarse classification of a step failure.
///
/// Informational by default: the retry policy treats every kind alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Provider throttling or exhausted quota.
    RateLimitOrQuota,
    /// Generated output failed to parse.
    InvalidOutputSyntax,
    /// Connection failures and timeouts.
    NetworkOrTimeout,
    /// A required resource does not exist.
    ResourceNotFound,
    /// The upstream API reported an error.
    UpstreamApiError,
    /// Rendering, encoding or muxing failed.
    RenderingFailure,
    /// Data had an unexpected shape.
    MalformedData,
    /// Nothing matched.
    Unknown,
}

impl ErrorKind {
    /// All kinds, in classification-rule order.
    pub const ALL: [Self; 8] = [
        Self::RateLimitOrQuota,
        Self::InvalidOutputSyntax,
        Self::NetworkOrTimeout,
        Self::ResourceNotFound,
        Self::UpstreamApiError,
        Self::RenderingFailure,
        Self::MalformedData,
        Self::Unknown,
    ];
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimitOrQuota => write!(f, "rate_limit_or_quota"),
            Self::InvalidOutputSyntax => write!(f, "invalid_output_syntax"),
            Self::NetworkOrTimeout => write!(f, "network_or_timeout"),
            Self::ResourceNotFound => write!(f, "resource_not_found"),
            Self::UpstreamApiError => write!(f, "upstream_api_error"),
            Self::RenderingFailure => write!(f, "rendering_failure"),
            Self::MalformedData => write!(f, "malformed_data"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(JobStatus::Degraded.to_string(), "degraded");
    }

    #[test]
    fn test_job_status_is_terminal() {
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Degraded.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_job_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Degraded));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Error));

        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Done));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Degraded));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Processing));
        for terminal in [JobStatus::Done, JobStatus::Error, JobStatus::Degraded] {
            for next in [
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Done,
                JobStatus::Error,
                JobStatus::Degraded,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_job_status_serialize() {
        let json = serde_json::to_string(&JobStatus::Degraded).unwrap();
        assert_eq!(json, r#""degraded""#);

        let deserialized: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, JobStatus::Degraded);
    }

    #[test]
    fn test_error_kind_serialize_matches_display() {
        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
