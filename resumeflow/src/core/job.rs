//! The persisted job record and its append-only error log.

use super::{ErrorKind, JobStatus, Usage};
use crate::errors::InvalidTransitionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// UTC timestamp used on job and error records.
pub type Timestamp = DateTime<Utc>;

/// Opaque unique job key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a new time-ordered job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reference to a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef {
    /// The job.
    pub job_id: JobId,
    /// The step whose completion the checkpoint captures.
    pub step_index: usize,
    /// Hex sha256 of the snapshot bytes.
    pub digest: String,
}

impl fmt::Display for CheckpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{}/{}@{}", self.job_id, self.step_index, short)
    }
}

/// Which decision produced an error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// A live attempt of the step failed. Counts toward `total_retries`.
    StepAttempt,
    /// Retries ran out and a fallback result was substituted.
    FallbackSubstituted,
    /// Retries ran out and the fallback could not be produced.
    FallbackFailed,
    /// The step succeeded but its checkpoint could not be written.
    CheckpointWrite,
    /// A resumed job could not rehydrate its working state.
    Resume,
}

/// One entry in a job's error log. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The step the error belongs to.
    pub step_index: usize,
    /// The step name, for display.
    #[serde(default)]
    pub step_name: String,
    /// Classified error kind.
    pub error_kind: ErrorKind,
    /// Error message.
    pub message: String,
    /// How many retries the step had used when the error was recorded.
    pub retry_count: u32,
    /// True when a fallback result was substituted for the step.
    pub fallback_used: bool,
    /// Checkpoint that was restored before the next attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_restored: Option<CheckpointRef>,
    /// Which decision produced the record.
    pub origin: ErrorOrigin,
    /// When the record was appended.
    pub timestamp: Timestamp,
}

impl ErrorRecord {
    /// Creates a record for a failed live attempt.
    #[must_use]
    pub fn new(step_index: usize, error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            step_index,
            step_name: String::new(),
            error_kind,
            message: message.into(),
            retry_count: 0,
            fallback_used: false,
            checkpoint_restored: None,
            origin: ErrorOrigin::StepAttempt,
            timestamp: Utc::now(),
        }
    }

    /// Sets the step name.
    #[must_use]
    pub fn with_step_name(mut self, name: impl Into<String>) -> Self {
        self.step_name = name.into();
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the origin. `fallback_used` follows from it.
    #[must_use]
    pub fn with_origin(mut self, origin: ErrorOrigin) -> Self {
        self.origin = origin;
        self.fallback_used = origin == ErrorOrigin::FallbackSubstituted;
        self
    }

    /// Records the checkpoint restored before the next attempt.
    #[must_use]
    pub fn with_checkpoint_restored(mut self, checkpoint: Option<CheckpointRef>) -> Self {
        self.checkpoint_restored = checkpoint;
        self
    }
}

/// Persisted status and metadata for one job.
///
/// Mutated only by the executor and step runner. The surrounding
/// application reads it through a job store and never writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique key.
    pub id: JobId,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Number of steps in the pipeline the job was submitted to.
    pub total_steps: usize,
    /// Index of the step being (or next to be) executed.
    pub current_step: usize,
    /// Completed step indices.
    pub steps_completed: BTreeSet<usize>,
    /// Failed live attempts across the whole job.
    pub total_retries: u32,
    /// Sticky: set once any step used a fallback.
    pub degraded_mode: bool,
    /// Append-only, chronological error log.
    pub errors: Vec<ErrorRecord>,
    /// Accumulated usage counters.
    #[serde(default)]
    pub usage: Usage,
    /// Initial working data supplied at submission.
    #[serde(default)]
    pub input: BTreeMap<String, serde_json::Value>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Set exactly once, on the first terminal transition.
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// Creates a pending job for a pipeline of `total_steps` steps.
    #[must_use]
    pub fn new(total_steps: usize) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            total_steps,
            current_step: 0,
            steps_completed: BTreeSet::new(),
            total_retries: 0,
            degraded_mode: false,
            errors: Vec::new(),
            usage: Usage::default(),
            input: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Sets the job id.
    #[must_use]
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Sets the initial working data.
    #[must_use]
    pub fn with_input(mut self, input: BTreeMap<String, serde_json::Value>) -> Self {
        self.input = input;
        self
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransitionError {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Moves a pending job to `Processing`. A no-op if already processing.
    pub fn start_processing(&mut self) -> Result<(), InvalidTransitionError> {
        if self.status == JobStatus::Processing {
            return Ok(());
        }
        self.transition(JobStatus::Processing)
    }

    /// Moves the job to a terminal status and stamps `completed_at`.
    pub fn finish(&mut self, status: JobStatus) -> Result<(), InvalidTransitionError> {
        if !status.is_terminal() {
            return Err(InvalidTransitionError {
                job_id: self.id,
                from: self.status,
                to: status,
            });
        }
        self.transition(status)
    }

    /// The terminal status a fully completed job should receive.
    #[must_use]
    pub fn success_status(&self) -> JobStatus {
        if self.degraded_mode {
            JobStatus::Degraded
        } else {
            JobStatus::Done
        }
    }

    /// Appends an error record.
    ///
    /// Live-attempt failures bump `total_retries`; fallback substitutions
    /// set the sticky `degraded_mode` flag.
    pub fn push_error(&mut self, record: ErrorRecord) {
        if record.origin == ErrorOrigin::StepAttempt {
            self.total_retries = self.total_retries.saturating_add(1);
        }
        if record.fallback_used {
            self.degraded_mode = true;
        }
        self.errors.push(record);
        self.touch();
    }

    /// Marks a step as completed.
    pub fn mark_step_completed(&mut self, step_index: usize) {
        self.steps_completed.insert(step_index);
        self.touch();
    }

    /// Sets the sticky degraded flag.
    pub fn mark_degraded(&mut self) {
        self.degraded_mode = true;
        self.touch();
    }

    /// Advances `current_step` past `step_index`.
    pub fn advance_past(&mut self, step_index: usize) {
        self.current_step = self.current_step.max(step_index + 1);
        self.touch();
    }

    /// Merges usage counters.
    pub fn merge_usage(&mut self, usage: &Usage) {
        self.usage.merge(usage);
    }

    /// Returns true if the step already completed.
    #[must_use]
    pub fn is_step_completed(&self, step_index: usize) -> bool {
        self.steps_completed.contains(&step_index)
    }

    /// Highest completed step index, if any.
    #[must_use]
    pub fn highest_completed(&self) -> Option<usize> {
        self.steps_completed.last().copied()
    }

    /// Returns true if the job reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Number of fallback substitutions.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.errors.iter().filter(|e| e.fallback_used).count()
    }

    /// Error records belonging to one step.
    pub fn errors_for_step(&self, step_index: usize) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter().filter(move |e| e.step_index == step_index)
    }

    /// Advisory flag: enough errors accumulated to warrant human review,
    /// regardless of final status.
    #[must_use]
    pub fn needs_review(&self, error_count_threshold: usize) -> bool {
        self.errors.len() >= error_count_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(5);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_steps, 5);
        assert!(job.steps_completed.is_empty());
        assert!(job.completed_at.is_none());
        assert_eq!(job.highest_completed(), None);
    }

    #[test]
    fn test_lifecycle_sets_completed_at_once() {
        let mut job = Job::new(1);
        job.start_processing().unwrap();
        job.start_processing().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.completed_at.is_none());

        job.finish(JobStatus::Done).unwrap();
        let completed_at = job.completed_at;
        assert!(completed_at.is_some());

        let err = job.finish(JobStatus::Error).unwrap_err();
        assert_eq!(err.from, JobStatus::Done);
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.completed_at, completed_at);
    }

    #[test]
    fn test_finish_rejects_non_terminal() {
        let mut job = Job::new(1);
        job.start_processing().unwrap();
        assert!(job.finish(JobStatus::Pending).is_err());
        assert!(job.finish(JobStatus::Processing).is_err());
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_pending_job_cannot_finish() {
        let mut job = Job::new(1);
        let err = job.finish(JobStatus::Error).unwrap_err();
        assert_eq!(err.from, JobStatus::Pending);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_terminal_job_cannot_restart() {
        let mut job = Job::new(1);
        job.start_processing().unwrap();
        job.finish(JobStatus::Error).unwrap();
        assert!(job.start_processing().is_err());
    }

    #[test]
    fn test_push_error_counts_attempts_only() {
        let mut job = Job::new(3);
        job.push_error(ErrorRecord::new(1, ErrorKind::NetworkOrTimeout, "timeout"));
        job.push_error(ErrorRecord::new(1, ErrorKind::NetworkOrTimeout, "timeout"));
        job.push_error(
            ErrorRecord::new(1, ErrorKind::Unknown, "checkpoint write failed")
                .with_origin(ErrorOrigin::CheckpointWrite),
        );
        assert_eq!(job.total_retries, 2);
        assert!(!job.degraded_mode);

        job.push_error(
            ErrorRecord::new(1, ErrorKind::NetworkOrTimeout, "gave up")
                .with_origin(ErrorOrigin::FallbackSubstituted),
        );
        assert_eq!(job.total_retries, 2);
        assert!(job.degraded_mode);
        assert_eq!(job.fallback_count(), 1);
        assert_eq!(job.errors_for_step(1).count(), 4);
        assert_eq!(job.errors_for_step(0).count(), 0);
    }

    #[test]
    fn test_origin_drives_fallback_flag() {
        let rec = ErrorRecord::new(0, ErrorKind::Unknown, "x")
            .with_origin(ErrorOrigin::FallbackFailed);
        assert!(!rec.fallback_used);

        let rec = ErrorRecord::new(0, ErrorKind::Unknown, "x")
            .with_origin(ErrorOrigin::FallbackSubstituted);
        assert!(rec.fallback_used);
    }

    #[test]
    fn test_success_status_follows_degraded_flag() {
        let mut job = Job::new(2);
        assert_eq!(job.success_status(), JobStatus::Done);
        job.mark_degraded();
        assert_eq!(job.success_status(), JobStatus::Degraded);
    }

    #[test]
    fn test_step_tracking() {
        let mut job = Job::new(4);
        job.mark_step_completed(0);
        job.advance_past(0);
        job.mark_step_completed(1);
        job.advance_past(1);
        assert!(job.is_step_completed(1));
        assert!(!job.is_step_completed(2));
        assert_eq!(job.highest_completed(), Some(1));
        assert_eq!(job.current_step, 2);
    }

    #[test]
    fn test_needs_review_threshold() {
        let mut job = Job::new(1);
        for _ in 0..4 {
            job.push_error(ErrorRecord::new(0, ErrorKind::Unknown, "boom"));
        }
        assert!(!job.needs_review(5));
        job.push_error(ErrorRecord::new(0, ErrorKind::Unknown, "boom"));
        assert!(job.needs_review(5));
    }

    #[test]
    fn test_job_id_roundtrips_through_string() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_job_serializes_status_as_snake_case() {
        let job = Job::new(1);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["degraded_mode"], false);
    }

    #[test]
    fn test_checkpoint_ref_display() {
        let r = CheckpointRef {
            job_id: JobId::new(),
            step_index: 2,
            digest: "abcdef0123456789".to_string(),
        };
        assert!(r.to_string().ends_with("/2@abcdef012345"));
    }
}
