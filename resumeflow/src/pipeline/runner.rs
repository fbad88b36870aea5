//! Executes one step under the retry, backoff and fallback policy.
//!
//! Per invocation the runner moves through
//! `Attempting -> Succeeded | Backoff -> Attempting | FallbackAttempted | FailedPermanently`.
//! Step failures never escape: every path ends in a [`StepOutcome`].

use super::clock::{Sleeper, TokioSleeper};
use super::retry::{Exhaustion, RetryDecision};
use super::StepSpec;
use crate::checkpoint::CheckpointStore;
use crate::classify::ErrorClassifier;
use crate::config::ExecutorConfig;
use crate::context::PipelineContext;
use crate::core::{CheckpointRef, ErrorKind, ErrorOrigin, ErrorRecord, Job, StepOutput};
use crate::events::{EventSink, EventType, NoOpEventSink};
use crate::fallback::{FallbackProvider, NoFallbacks};
use crate::jobs::JobStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of running one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// True if the step produced a usable result, live or substituted.
    pub ok: bool,
    /// The result, absent on permanent failure.
    pub output: Option<StepOutput>,
    /// True if the result is a fallback substitute.
    pub degraded: bool,
}

impl StepOutcome {
    fn succeeded(output: StepOutput) -> Self {
        Self {
            ok: true,
            output: Some(output),
            degraded: false,
        }
    }

    fn substituted(output: StepOutput) -> Self {
        Self {
            ok: true,
            output: Some(output),
            degraded: true,
        }
    }

    fn failed() -> Self {
        Self {
            ok: false,
            output: None,
            degraded: false,
        }
    }
}

/// Runs a single step for a job.
///
/// Holds only shared, read-mostly collaborators; one runner serves every
/// job in the process.
#[derive(Clone)]
pub struct StepRunner {
    config: Arc<ExecutorConfig>,
    classifier: Arc<ErrorClassifier>,
    checkpoints: Arc<dyn CheckpointStore>,
    jobs: Arc<dyn JobStore>,
    fallbacks: Arc<dyn FallbackProvider>,
    sleeper: Arc<dyn Sleeper>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner")
            .field("config", &self.config)
            .field("sleeper", &self.sleeper)
            .finish_non_exhaustive()
    }
}

impl StepRunner {
    /// Creates a runner with default configuration, no fallbacks, the
    /// tokio timer and no event sink.
    #[must_use]
    pub fn new(checkpoints: Arc<dyn CheckpointStore>, jobs: Arc<dyn JobStore>) -> Self {
        Self {
            config: Arc::new(ExecutorConfig::default()),
            classifier: Arc::new(ErrorClassifier::default()),
            checkpoints,
            jobs,
            fallbacks: Arc::new(NoFallbacks),
            sleeper: Arc::new(TokioSleeper),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Arc<ExecutorConfig>) -> Self {
        self.config = config;
        self
    }

    /// Sets the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the fallback provider.
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: Arc<dyn FallbackProvider>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Sets the backoff sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Runs `spec` as step `step_index` of `job`.
    ///
    /// On success the output is merged into `ctx`, the merged context is
    /// checkpointed, and only then is the step marked completed on `job`.
    /// Every failed attempt, substitution and storage fault is appended to
    /// the job's error log in the order it happened.
    pub async fn run(
        &self,
        job: &mut Job,
        ctx: &mut PipelineContext,
        step_index: usize,
        spec: &StepSpec,
    ) -> StepOutcome {
        let name = spec.name().to_string();
        let budget = self.config.retry_budget();
        let backoff = self.config.backoff_policy();
        let mut retries: u32 = 0;

        loop {
            self.emit(
                EventType::StepStarted,
                job,
                step_index,
                &name,
                json!({ "attempt": retries + 1 }),
            )
            .await;

            let err = match spec.step.run(ctx).await {
                Ok(output) => {
                    self.commit(job, ctx, step_index, &name, &output, false).await;
                    self.emit(
                        EventType::StepCompleted,
                        job,
                        step_index,
                        &name,
                        json!({ "retries": retries, "fallback": false }),
                    )
                    .await;
                    return StepOutcome::succeeded(output);
                }
                Err(err) => err,
            };

            let kind = self.classifier.classify(&err);
            let message = err.to_string();
            let job_retries = job.total_retries.saturating_add(1);
            let decision = budget.decide(retries, job_retries, kind, &backoff);

            warn!(
                job_id = %job.id,
                step = %name,
                step_index,
                retry_count = retries,
                error_kind = %kind,
                error = %message,
                "Step attempt failed"
            );

            match decision {
                RetryDecision::Retry { attempt, delay } => {
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    let restored = self.restore_previous(job, ctx, step_index).await;
                    job.push_error(
                        ErrorRecord::new(step_index, kind, &message)
                            .with_step_name(&name)
                            .with_retry_count(retries)
                            .with_checkpoint_restored(restored),
                    );
                    self.persist(job).await;

                    self.emit(
                        EventType::StepRetrying,
                        job,
                        step_index,
                        &name,
                        json!({
                            "attempt": attempt,
                            "delay_ms": delay_ms,
                            "error_kind": kind,
                            "error": message,
                        }),
                    )
                    .await;
                    debug!(
                        job_id = %job.id,
                        attempt,
                        delay_ms,
                        error = %message,
                        "Retrying after error"
                    );

                    self.sleeper.sleep(delay).await;
                    retries += 1;
                }
                RetryDecision::Exhausted(reason) => {
                    job.push_error(
                        ErrorRecord::new(step_index, kind, &message)
                            .with_step_name(&name)
                            .with_retry_count(retries),
                    );
                    self.persist(job).await;
                    return self
                        .escalate(job, ctx, step_index, spec, kind, &message, reason, retries)
                        .await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn escalate(
        &self,
        job: &mut Job,
        ctx: &mut PipelineContext,
        step_index: usize,
        spec: &StepSpec,
        kind: ErrorKind,
        message: &str,
        reason: Exhaustion,
        retries: u32,
    ) -> StepOutcome {
        let name = spec.name();

        if !spec.allow_fallback {
            warn!(
                job_id = %job.id,
                step = %name,
                step_index,
                reason = %reason,
                "Step failed permanently; fallback not permitted"
            );
            self.emit(
                EventType::StepFailed,
                job,
                step_index,
                name,
                json!({ "reason": reason.to_string(), "error_kind": kind, "error": message }),
            )
            .await;
            return StepOutcome::failed();
        }

        match self.fallbacks.get_fallback(step_index, ctx) {
            Ok(output) => {
                job.push_error(
                    ErrorRecord::new(
                        step_index,
                        kind,
                        format!("{reason}; fallback substituted after: {message}"),
                    )
                    .with_step_name(name)
                    .with_retry_count(retries)
                    .with_origin(ErrorOrigin::FallbackSubstituted),
                );
                warn!(
                    job_id = %job.id,
                    step = %name,
                    step_index,
                    reason = %reason,
                    "Substituting fallback result"
                );
                self.emit(
                    EventType::StepFallback,
                    job,
                    step_index,
                    name,
                    json!({ "reason": reason.to_string(), "error_kind": kind }),
                )
                .await;

                self.commit(job, ctx, step_index, name, &output, true).await;
                self.emit(
                    EventType::StepCompleted,
                    job,
                    step_index,
                    name,
                    json!({ "retries": retries, "fallback": true }),
                )
                .await;
                StepOutcome::substituted(output)
            }
            Err(err) => {
                job.push_error(
                    ErrorRecord::new(
                        step_index,
                        ErrorKind::Unknown,
                        format!("fallback failed: {err}; last error: {message}"),
                    )
                    .with_step_name(name)
                    .with_retry_count(retries)
                    .with_origin(ErrorOrigin::FallbackFailed),
                );
                self.persist(job).await;
                warn!(
                    job_id = %job.id,
                    step = %name,
                    step_index,
                    error = %err,
                    "Fallback failed; step failed permanently"
                );
                self.emit(
                    EventType::StepFailed,
                    job,
                    step_index,
                    name,
                    json!({ "reason": "fallback failed", "error": err.to_string() }),
                )
                .await;
                StepOutcome::failed()
            }
        }
    }

    /// Merges the output, writes the checkpoint, then marks the step done.
    async fn commit(
        &self,
        job: &mut Job,
        ctx: &mut PipelineContext,
        step_index: usize,
        name: &str,
        output: &StepOutput,
        fallback: bool,
    ) {
        ctx.apply(step_index, output, fallback);

        let saved = match ctx.snapshot() {
            Ok(snapshot) => self
                .checkpoints
                .save(job.id, step_index, &snapshot)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match saved {
            Ok(checkpoint) => {
                debug!(job_id = %job.id, step_index, checkpoint = %checkpoint, "Checkpoint saved");
            }
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    step = %name,
                    step_index,
                    error = %err,
                    "Checkpoint save failed; step result kept but cannot be resumed from"
                );
                job.push_error(
                    ErrorRecord::new(
                        step_index,
                        ErrorKind::Unknown,
                        format!("checkpoint write failed: {err}"),
                    )
                    .with_step_name(name)
                    .with_origin(ErrorOrigin::CheckpointWrite),
                );
            }
        }

        job.mark_step_completed(step_index);
        job.merge_usage(&output.usage);
    }

    /// Resets `ctx` to the checkpoint of the previous step before a retry.
    async fn restore_previous(
        &self,
        job: &Job,
        ctx: &mut PipelineContext,
        step_index: usize,
    ) -> Option<CheckpointRef> {
        if !self.config.restore_checkpoint_on_retry || step_index == 0 {
            return None;
        }
        let previous = step_index - 1;

        let snapshot = match self.checkpoints.load(job.id, previous).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    step_index = previous,
                    error = %err,
                    "Checkpoint unavailable for restore"
                );
                return None;
            }
        };

        match PipelineContext::restore(&snapshot) {
            Ok(restored) => {
                *ctx = restored;
                let checkpoint = CheckpointRef {
                    job_id: job.id,
                    step_index: previous,
                    digest: snapshot.digest(),
                };
                info!(
                    job_id = %job.id,
                    step_index,
                    checkpoint = %checkpoint,
                    "Checkpoint restored before retry"
                );
                Some(checkpoint)
            }
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    step_index = previous,
                    error = %err,
                    "Checkpoint could not be decoded for restore"
                );
                None
            }
        }
    }

    async fn persist(&self, job: &Job) {
        if let Err(err) = self.jobs.save(job).await {
            warn!(job_id = %job.id, error = %err, "Failed to persist job record");
        }
    }

    async fn emit(&self, event: EventType, job: &Job, step_index: usize, name: &str, extra: Value) {
        let mut data = json!({
            "job_id": job.id.to_string(),
            "step_index": step_index,
            "step": name,
        });
        if let (Some(map), Value::Object(extra)) = (data.as_object_mut(), extra) {
            map.extend(extra);
        }
        self.events.emit(event, data).await;
    }
}
