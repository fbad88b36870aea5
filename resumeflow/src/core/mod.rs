//! Core domain model types for resumeflow.
//!
//! This module contains the fundamental types used throughout the executor:
//! - Job status and error kind enums
//! - The job record and its error log
//! - Step output and usage counters

mod job;
mod output;
mod status;

pub use job::{CheckpointRef, ErrorOrigin, ErrorRecord, Job, JobId, Timestamp};
pub use output::{StepOutput, Usage};
pub use status::{ErrorKind, JobStatus};
