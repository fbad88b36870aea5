//! Testing utilities for resumeflow pipelines.
//!
//! This module provides:
//! - Scripted steps that fail a set number of times
//! - A sleeper that records backoff delays instead of waiting
//! - Assertions for the job record invariants

mod assertions;
mod mocks;

pub use assertions::{assert_job_invariants, assert_steps_prefix};
pub use mocks::{RecordingSleeper, ScriptedStep};
