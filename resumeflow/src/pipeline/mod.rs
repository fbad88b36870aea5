//! Pipeline definition and execution.
//!
//! A [`Pipeline`] is a fixed, ordered list of steps built once with
//! [`PipelineBuilder`]. The [`PipelineExecutor`] drives one job at a time
//! through it, delegating each step to the [`StepRunner`].

mod builder;
mod clock;
mod executor;
mod retry;
mod runner;
mod spec;


pub use builder::{Pipeline, PipelineBuilder};
pub use clock::{Sleeper, TokioSleeper};
pub use executor::{JobReport, PipelineExecutor};
pub use retry::{
    BackoffPolicy, BackoffStrategy, Exhaustion, JitterStrategy, RetryBudget, RetryDecision,
};
pub use runner::{StepOutcome, StepRunner};
pub use spec::StepSpec;
