//! # Resumeflow
//!
//! A checkpointed, retrying executor for multi-stage generation jobs.
//!
//! A job runs a fixed sequence of steps, each consuming the working state
//! left by the previous one. Resumeflow keeps the job moving when
//! individual steps fail:
//!
//! - **Retry with backoff**: failed attempts are retried after
//!   exponentially growing, capped delays, bounded per step and per job
//! - **Checkpoints**: the working state is saved after every step, so a
//!   re-invoked job resumes after its last completed step
//! - **Fallbacks**: a step that keeps failing can be replaced by a static
//!   placeholder, finishing the job as `Degraded` instead of `Error`
//! - **Error classification**: every failure is tagged with a coarse
//!   [`ErrorKind`](core::ErrorKind) and logged on the job record
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resumeflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("video")
//!     .step(Arc::new(ScriptStep::new()))
//!     .step(Arc::new(AnimationStep::new()))
//!     .step_without_fallback(Arc::new(RenderStep::new()))
//!     .build()?;
//!
//! let executor = PipelineExecutor::new(pipeline, jobs, checkpoints)
//!     .with_fallbacks(Arc::new(content_pipeline_fallbacks()));
//!
//! let report = executor.execute(input).await?;
//! match report.status {
//!     JobStatus::Done => {}
//!     JobStatus::Degraded => println!("completed with reduced quality"),
//!     _ => println!("failed, see errors"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod fallback;
pub mod jobs;
pub mod observability;
pub mod pipeline;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
    pub use crate::classify::{ClassificationRule, ErrorClassifier};
    pub use crate::config::ExecutorConfig;
    pub use crate::context::{ContextSnapshot, PipelineContext};
    pub use crate::core::{
        CheckpointRef, ErrorKind, ErrorOrigin, ErrorRecord, Job, JobId, JobStatus, StepOutput,
        Usage,
    };
    pub use crate::errors::{
        CheckpointError, JobStoreError, PipelineValidationError, ResumeflowError, StepError,
    };
    pub use crate::events::{EventSink, EventType, LoggingEventSink, NoOpEventSink};
    pub use crate::fallback::{
        content_pipeline_fallbacks, ContentStage, FallbackError, FallbackProvider, NoFallbacks,
        StaticFallbackProvider,
    };
    pub use crate::jobs::{InMemoryJobStore, JobStore};
    pub use crate::pipeline::{
        JobReport, Pipeline, PipelineBuilder, PipelineExecutor, StepOutcome, StepRunner, StepSpec,
    };
    pub use crate::steps::{AsyncFnStep, FnStep, Step};
    pub use std::sync::Arc;
}
