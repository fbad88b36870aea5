//! Assertions over job records.

use crate::core::{ErrorOrigin, Job, JobStatus};

/// Asserts that `steps_completed` is exactly `{0, .., len - 1}`.
pub fn assert_steps_prefix(job: &Job, len: usize) {
    let expected: Vec<usize> = (0..len).collect();
    let actual: Vec<usize> = job.steps_completed.iter().copied().collect();
    assert_eq!(
        actual, expected,
        "Expected steps_completed to be the prefix 0..{len}, got {actual:?}"
    );
}

/// Asserts the invariants every job record must satisfy.
///
/// - Done/Degraded jobs completed every step; other jobs completed a strict
///   prefix of the steps, with no gaps.
/// - `completed_at` is set exactly when the status is terminal.
/// - `degraded_mode` is set iff some record has `fallback_used`.
/// - Degraded is reported iff a successful job used a fallback.
/// - `total_retries` equals the number of failed live attempts recorded,
///   and equals the number of records without a fallback when no storage
///   faults were logged.
/// - Error records are in chronological order.
pub fn assert_job_invariants(job: &Job) {
    let completed = job.steps_completed.len();
    match job.status {
        JobStatus::Done | JobStatus::Degraded => assert_steps_prefix(job, job.total_steps),
        _ => {
            assert!(
                completed < job.total_steps || job.total_steps == 0,
                "Unfinished job {} has all {} steps completed",
                job.id,
                job.total_steps
            );
            assert_steps_prefix(job, completed);
        }
    }

    assert_eq!(
        job.completed_at.is_some(),
        job.status.is_terminal(),
        "completed_at must be set exactly for terminal jobs (status {})",
        job.status
    );

    let any_fallback = job.errors.iter().any(|e| e.fallback_used);
    assert_eq!(
        job.degraded_mode, any_fallback,
        "degraded_mode must match presence of fallback records"
    );
    if job.status.is_success() {
        assert_eq!(
            job.status == JobStatus::Degraded,
            job.degraded_mode,
            "Successful job status {} disagrees with degraded_mode {}",
            job.status,
            job.degraded_mode
        );
    }

    let attempts = job
        .errors
        .iter()
        .filter(|e| e.origin == ErrorOrigin::StepAttempt)
        .count();
    assert_eq!(
        job.total_retries as usize, attempts,
        "total_retries must count failed live attempts"
    );

    let storage_faults = job.errors.iter().any(|e| {
        matches!(
            e.origin,
            ErrorOrigin::CheckpointWrite | ErrorOrigin::FallbackFailed | ErrorOrigin::Resume
        )
    });
    if !storage_faults {
        let without_fallback = job.errors.iter().filter(|e| !e.fallback_used).count();
        assert_eq!(job.total_retries as usize, without_fallback);
    }

    assert!(
        job.errors.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
        "Error records out of chronological order"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorKind, ErrorRecord};

    #[test]
    fn test_invariants_hold_for_finished_job() {
        let mut job = Job::new(2);
        job.start_processing().unwrap();
        job.push_error(ErrorRecord::new(0, ErrorKind::NetworkOrTimeout, "timeout"));
        job.mark_step_completed(0);
        job.mark_step_completed(1);
        job.finish(JobStatus::Done).unwrap();
        assert_job_invariants(&job);
    }

    #[test]
    #[should_panic(expected = "degraded_mode")]
    fn test_detects_degraded_mismatch() {
        let mut job = Job::new(1);
        job.mark_degraded();
        assert_job_invariants(&job);
    }

    #[test]
    #[should_panic(expected = "prefix")]
    fn test_detects_gap() {
        let mut job = Job::new(3);
        job.mark_step_completed(1);
        assert_job_invariants(&job);
    }
}
