//! Error types for the resumeflow executor.
//!
//! Two channels are kept apart:
//!
//! - [`StepError`] is what a step returns for an *expected* failure. The
//!   step runner catches it, classifies it and turns it into a retry,
//!   a fallback or a permanent failure. It never reaches callers of the
//!   executor.
//! - [`ResumeflowError`] covers infrastructure faults and contract
//!   violations (missing job, busy job, storage failure, illegal status
//!   transition). These are returned from [`PipelineExecutor::run`].
//!
//! [`PipelineExecutor::run`]: crate::pipeline::PipelineExecutor::run

use crate::core::{JobId, JobStatus};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ResumeflowError>;

/// The main error type for executor operations.
#[derive(Debug, Error)]
pub enum ResumeflowError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The job does not exist in the job store.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Another worker currently holds the lease on this job.
    #[error("Job {0} is already being processed by another worker")]
    JobBusy(JobId),

    /// The job was created for a pipeline with a different number of steps.
    #[error("Job {job_id} expects {expected} steps but the pipeline has {actual}")]
    StepCountMismatch {
        /// The job.
        job_id: JobId,
        /// Steps recorded on the job.
        expected: usize,
        /// Steps in the pipeline.
        actual: usize,
    },

    /// A status transition that the job state machine forbids.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),

    /// The job store failed.
    #[error("{0}")]
    JobStore(#[from] JobStoreError),

    /// The checkpoint store failed in a way that cannot be tolerated.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// Configuration was rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The log subscriber could not be installed.
    #[error("Tracing setup failed: {0}")]
    Observability(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A failure raised by a step.
///
/// Steps must signal failure through this type rather than a sentinel
/// value. The variant name feeds the error classifier through
/// [`StepError::type_name`].
#[derive(Debug, Error)]
pub enum StepError {
    /// The step gave up waiting on an external call.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The upstream provider throttled the request or a quota ran out.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The upstream API answered with an error status.
    #[error("http {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Generated output did not parse (e.g. a script with a syntax error).
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// A resource the step depends on is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rendering, encoding or muxing failed.
    #[error("rendering failed: {0}")]
    Rendering(String),

    /// Input or intermediate data had an unexpected shape.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepError {
    /// Returns the variant name, used for type-name classification rules.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "Timeout",
            Self::Network(_) => "Network",
            Self::RateLimited(_) => "RateLimited",
            Self::Http { .. } => "Http",
            Self::InvalidOutput(_) => "InvalidOutput",
            Self::NotFound(_) => "NotFound",
            Self::Rendering(_) => "Rendering",
            Self::Malformed(_) => "Malformed",
            Self::Other(_) => "Other",
        }
    }

    /// Creates an `Other` error from a message.
    #[must_use]
    pub fn other(message: impl std::fmt::Display) -> Self {
        Self::Other(anyhow::anyhow!("{message}"))
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::TimedOut => Self::Timeout(err.to_string()),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => Self::Network(err.to_string()),
            _ => Self::Other(err.into()),
        }
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors produced by checkpoint stores.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// No checkpoint exists under the key.
    #[error("No checkpoint for job {job_id} at step {step_index}")]
    NotFound {
        /// The job.
        job_id: JobId,
        /// The step index.
        step_index: usize,
    },

    /// A stored checkpoint failed its integrity check.
    #[error("Corrupt checkpoint for job {job_id} at step {step_index}: {reason}")]
    Corrupt {
        /// The job.
        job_id: JobId,
        /// The step index.
        step_index: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// File-system I/O failure.
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure.
    #[error("Checkpoint backend error: {0}")]
    Backend(String),
}

/// Errors produced by job stores.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// The job does not exist.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// A job with the same id was already created.
    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    /// Any backend failure.
    #[error("Job store backend error: {0}")]
    Backend(String),
}

/// Raised when the job state machine refuses a transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid job status transition for {job_id}: {from} -> {to}")]
pub struct InvalidTransitionError {
    /// The job.
    pub job_id: JobId,
    /// Current status.
    pub from: JobStatus,
    /// Requested status.
    pub to: JobStatus,
}

/// Raised when a pipeline definition is malformed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    pub steps: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("steps".to_string(), serde_json::json!(self.steps));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_type_names() {
        assert_eq!(StepError::Timeout("x".into()).type_name(), "Timeout");
        assert_eq!(
            StepError::Http { status: 503, message: "down".into() }.type_name(),
            "Http"
        );
        assert_eq!(StepError::other("boom").type_name(), "Other");
    }

    #[test]
    fn test_step_error_display() {
        let err = StepError::Http { status: 429, message: "slow down".into() };
        assert_eq!(err.to_string(), "http 429: slow down");

        let err = StepError::other("something odd");
        assert_eq!(err.to_string(), "something odd");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        assert!(matches!(StepError::from(io), StepError::Timeout(_)));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.png");
        assert!(matches!(StepError::from(io), StepError::NotFound(_)));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(StepError::from(io), StepError::Other(_)));
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(StepError::from(err), StepError::Malformed(_)));
    }

    #[test]
    fn test_validation_error_to_dict() {
        let err = PipelineValidationError::new("Duplicate step name")
            .with_steps(vec!["render".to_string()]);
        let dict = err.to_dict();
        assert_eq!(dict["message"], "Duplicate step name");
        assert_eq!(dict["steps"], serde_json::json!(["render"]));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = InvalidTransitionError {
            job_id: JobId::new(),
            from: JobStatus::Done,
            to: JobStatus::Processing,
        };
        assert!(err.to_string().contains("done -> processing"));
    }
}
