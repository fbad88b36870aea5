//! Drives a job through its step sequence to a terminal status.

use super::clock::Sleeper;
use super::runner::StepRunner;
use super::Pipeline;
use crate::checkpoint::CheckpointStore;
use crate::classify::ErrorClassifier;
use crate::config::ExecutorConfig;
use crate::context::PipelineContext;
use crate::core::{ErrorKind, ErrorOrigin, ErrorRecord, Job, JobId, JobStatus, Usage};
use crate::errors::{CheckpointError, JobStoreError, ResumeflowError, Result};
use crate::events::{EventSink, EventType, NoOpEventSink};
use crate::fallback::FallbackProvider;
use crate::jobs::{JobLease, JobStore};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of a job after an executor run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    /// The job.
    pub job_id: JobId,
    /// Terminal status: Done, Degraded or Error.
    pub status: JobStatus,
    /// Steps in the pipeline.
    pub total_steps: usize,
    /// Completed step indices.
    pub steps_completed: BTreeSet<usize>,
    /// Failed live attempts.
    pub total_retries: u32,
    /// Steps that received a fallback substitute.
    pub fallback_steps: Vec<usize>,
    /// Number of error records.
    pub error_count: usize,
    /// Advisory: the error count reached the review threshold.
    pub needs_review: bool,
    /// Accumulated usage.
    pub usage: Usage,
    /// Final working state; absent when the run did no work.
    #[serde(skip)]
    pub context: Option<PipelineContext>,
}

impl JobReport {
    fn new(job: &Job, context: Option<PipelineContext>, review_threshold: usize) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            total_steps: job.total_steps,
            steps_completed: job.steps_completed.clone(),
            total_retries: job.total_retries,
            fallback_steps: job
                .errors
                .iter()
                .filter(|e| e.fallback_used)
                .map(|e| e.step_index)
                .collect(),
            error_count: job.errors.len(),
            needs_review: job.needs_review(review_threshold),
            usage: job.usage,
            context,
        }
    }

    /// Fraction of steps that produced a result.
    #[must_use]
    pub fn completion_rate(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.steps_completed.len() as f64 / self.total_steps as f64
    }

    /// Returns true for Done and Degraded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }

    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("job_id".to_string(), json!(self.job_id.to_string()));
        map.insert("status".to_string(), json!(self.status));
        map.insert("total_steps".to_string(), json!(self.total_steps));
        map.insert("steps_completed".to_string(), json!(self.steps_completed));
        map.insert("completion_rate".to_string(), json!(self.completion_rate()));
        map.insert("total_retries".to_string(), json!(self.total_retries));
        map.insert("fallback_steps".to_string(), json!(self.fallback_steps));
        map.insert("error_count".to_string(), json!(self.error_count));
        map.insert("needs_review".to_string(), json!(self.needs_review));
        map.insert("usage".to_string(), json!(self.usage));
        map
    }
}

/// Runs jobs through a fixed pipeline.
///
/// One executor can be shared by any number of workers; each job is
/// driven by exactly one of them at a time, enforced by the job store
/// lease.
#[derive(Clone)]
pub struct PipelineExecutor {
    pipeline: Arc<Pipeline>,
    runner: StepRunner,
    config: Arc<ExecutorConfig>,
    jobs: Arc<dyn JobStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("pipeline", &self.pipeline.name())
            .field("steps", &self.pipeline.len())
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    /// Creates an executor with default configuration and no fallbacks.
    #[must_use]
    pub fn new(
        pipeline: Pipeline,
        jobs: Arc<dyn JobStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let config = Arc::new(ExecutorConfig::default());
        Self {
            pipeline: Arc::new(pipeline),
            runner: StepRunner::new(checkpoints.clone(), jobs.clone()).with_config(config.clone()),
            config,
            jobs,
            checkpoints,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Arc<ExecutorConfig>) -> Self {
        self.runner = self.runner.with_config(config.clone());
        self.config = config;
        self
    }

    /// Sets the fallback provider.
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: Arc<dyn FallbackProvider>) -> Self {
        self.runner = self.runner.with_fallbacks(fallbacks);
        self
    }

    /// Sets the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<ErrorClassifier>) -> Self {
        self.runner = self.runner.with_classifier(classifier);
        self
    }

    /// Sets the backoff sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.runner = self.runner.with_sleeper(sleeper);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.runner = self.runner.with_event_sink(events.clone());
        self.events = events;
        self
    }

    /// The pipeline this executor runs.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Creates a pending job seeded with `input`.
    pub async fn submit(&self, input: BTreeMap<String, Value>) -> Result<JobId> {
        let job = Job::new(self.pipeline.len()).with_input(input);
        self.jobs.create(&job).await?;
        info!(
            job_id = %job.id,
            pipeline = %self.pipeline.name(),
            steps = job.total_steps,
            "Job submitted"
        );
        Ok(job.id)
    }

    /// Submits a job and runs it to completion.
    pub async fn execute(&self, input: BTreeMap<String, Value>) -> Result<JobReport> {
        let job_id = self.submit(input).await?;
        self.run(job_id).await
    }

    /// Runs a job until it reaches a terminal status.
    ///
    /// Completed steps are skipped and the working state is rehydrated
    /// from the newest checkpoint, so calling this again after a crash
    /// resumes where the job stopped. On a job that is already terminal it
    /// does nothing and reports the stored status.
    ///
    /// Step failures are reflected in the report's status, never returned
    /// as errors. Errors mean the job could not be driven at all.
    ///
    /// # Errors
    ///
    /// - [`ResumeflowError::JobBusy`] if another worker holds the job.
    /// - [`ResumeflowError::JobNotFound`] if the job does not exist.
    /// - [`ResumeflowError::StepCountMismatch`] if the job was submitted to
    ///   a pipeline of a different length.
    /// - Job store failures.
    pub async fn run(&self, job_id: JobId) -> Result<JobReport> {
        let _lease = JobLease::acquire(self.jobs.as_ref(), job_id)
            .ok_or(ResumeflowError::JobBusy(job_id))?;

        let mut job = match self.jobs.get(job_id).await {
            Ok(job) => job,
            Err(JobStoreError::NotFound(_)) => return Err(ResumeflowError::JobNotFound(job_id)),
            Err(err) => return Err(err.into()),
        };

        if job.is_terminal() {
            debug!(job_id = %job.id, status = %job.status, "Job already terminal");
            return Ok(JobReport::new(&job, None, self.config.error_count_degraded_threshold));
        }

        if job.total_steps != self.pipeline.len() {
            return Err(ResumeflowError::StepCountMismatch {
                job_id,
                expected: job.total_steps,
                actual: self.pipeline.len(),
            });
        }

        job.start_processing()?;
        let recovered = self.recover_checkpointed_steps(&mut job).await;

        let mut ctx = match job.highest_completed() {
            None => {
                info!(job_id = %job.id, pipeline = %self.pipeline.name(), "Job started");
                self.emit(EventType::JobStarted, &job, json!({})).await;
                PipelineContext::new(job.id, job.input.clone())
            }
            Some(highest) => {
                let loaded = match recovered {
                    Some(ctx) => Ok(ctx),
                    None => self.load_context(job.id, highest).await,
                };
                match loaded {
                    Ok(ctx) => {
                        info!(
                            job_id = %job.id,
                            from_step = highest + 1,
                            "Job resumed from checkpoint"
                        );
                        self.emit(
                            EventType::JobResumed,
                            &job,
                            json!({ "checkpoint_step": highest }),
                        )
                        .await;
                        ctx
                    }
                    Err(err) => {
                        warn!(
                            job_id = %job.id,
                            step_index = highest,
                            error = %err,
                            "Cannot resume job"
                        );
                        job.push_error(
                            ErrorRecord::new(
                                highest,
                                ErrorKind::MalformedData,
                                format!("cannot resume from checkpoint: {err}"),
                            )
                            .with_origin(ErrorOrigin::Resume),
                        );
                        return self.finalize(job, JobStatus::Error, None).await;
                    }
                }
            }
        };
        self.jobs.save(&job).await?;

        for (step_index, spec) in self.pipeline.steps().iter().enumerate() {
            if job.is_step_completed(step_index) {
                debug!(job_id = %job.id, step_index, "Skipping completed step");
                continue;
            }

            job.current_step = step_index;
            let outcome = self.runner.run(&mut job, &mut ctx, step_index, spec).await;

            if !outcome.ok {
                return self.finalize(job, JobStatus::Error, Some(ctx)).await;
            }

            job.advance_past(step_index);
            if outcome.degraded {
                job.mark_degraded();
            }
            self.jobs.save(&job).await?;
        }

        let status = job.success_status();
        self.finalize(job, status, Some(ctx)).await
    }

    /// Marks steps completed whose checkpoint was written but whose
    /// completion never reached the job store, as happens when a worker
    /// stops between the two writes. Only checkpoints contiguous with the
    /// completed prefix count. Returns the context of the newest one.
    async fn recover_checkpointed_steps(&self, job: &mut Job) -> Option<PipelineContext> {
        let listed = match self.checkpoints.list(job.id).await {
            Ok(listed) => listed,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "Cannot list checkpoints");
                return None;
            }
        };

        let first = job.highest_completed().map_or(0, |highest| highest + 1);
        let recovered: Vec<usize> = (first..job.total_steps)
            .take_while(|step_index| listed.contains(step_index))
            .collect();
        let &newest = recovered.last()?;

        let ctx = match self.load_context(job.id, newest).await {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    step_index = newest,
                    error = %err,
                    "Ignoring unreadable checkpoint ahead of job record"
                );
                return None;
            }
        };

        for &step_index in &recovered {
            let has_fallback_record = job.errors_for_step(step_index).any(|e| e.fallback_used);
            if ctx.is_fallback(step_index) && !has_fallback_record {
                job.push_error(
                    ErrorRecord::new(
                        step_index,
                        ErrorKind::Unknown,
                        "fallback substituted; recovered from checkpoint",
                    )
                    .with_origin(ErrorOrigin::FallbackSubstituted),
                );
            }
            job.mark_step_completed(step_index);
            job.advance_past(step_index);
        }

        info!(job_id = %job.id, steps = ?recovered, "Recovered checkpointed steps");
        Some(ctx)
    }

    async fn load_context(
        &self,
        job_id: JobId,
        step_index: usize,
    ) -> std::result::Result<PipelineContext, CheckpointError> {
        let snapshot = self.checkpoints.load(job_id, step_index).await?;
        PipelineContext::restore(&snapshot).map_err(|e| CheckpointError::Corrupt {
            job_id,
            step_index,
            reason: e.to_string(),
        })
    }

    async fn finalize(
        &self,
        mut job: Job,
        status: JobStatus,
        ctx: Option<PipelineContext>,
    ) -> Result<JobReport> {
        job.finish(status)?;
        self.jobs.save(&job).await?;

        match self.checkpoints.delete_all(job.id).await {
            Ok(removed) => debug!(job_id = %job.id, removed, "Checkpoints cleaned up"),
            Err(err) => warn!(job_id = %job.id, error = %err, "Checkpoint cleanup failed"),
        }

        let threshold = self.config.error_count_degraded_threshold;
        if job.needs_review(threshold) {
            warn!(
                job_id = %job.id,
                errors = job.errors.len(),
                threshold,
                "Job error count reached review threshold"
            );
        }

        info!(
            job_id = %job.id,
            status = %job.status,
            total_retries = job.total_retries,
            degraded_mode = job.degraded_mode,
            steps_completed = job.steps_completed.len(),
            "Job finished"
        );
        self.emit(
            EventType::JobCompleted,
            &job,
            json!({
                "status": job.status,
                "total_retries": job.total_retries,
                "degraded_mode": job.degraded_mode,
            }),
        )
        .await;

        Ok(JobReport::new(&job, ctx, threshold))
    }

    async fn emit(&self, event: EventType, job: &Job, extra: Value) {
        let mut data = json!({ "job_id": job.id.to_string() });
        if let (Some(map), Value::Object(extra)) = (data.as_object_mut(), extra) {
            map.extend(extra);
        }
        self.events.emit(event, data).await;
    }
}
