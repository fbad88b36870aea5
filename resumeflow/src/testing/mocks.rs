//! Scripted steps and a recording clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::context::PipelineContext;
use crate::core::StepOutput;
use crate::errors::StepError;
use crate::pipeline::Sleeper;
use crate::steps::Step;

/// A step that plays back a script of failures, then succeeds.
#[derive(Debug)]
pub struct ScriptedStep {
    name: String,
    errors: Mutex<VecDeque<StepError>>,
    fail_forever: bool,
    output: StepOutput,
    calls: Mutex<usize>,
    contexts: Mutex<Vec<PipelineContext>>,
}

impl ScriptedStep {
    fn build(
        name: impl Into<String>,
        errors: Vec<StepError>,
        fail_forever: bool,
        output: StepOutput,
    ) -> Self {
        Self {
            name: name.into(),
            errors: Mutex::new(errors.into()),
            fail_forever,
            output,
            calls: Mutex::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds on every call.
    #[must_use]
    pub fn succeeding(name: impl Into<String>, output: StepOutput) -> Self {
        Self::build(name, Vec::new(), false, output)
    }

    /// Times out `failures` times, then succeeds.
    #[must_use]
    pub fn failing_then_ok(name: impl Into<String>, failures: usize, output: StepOutput) -> Self {
        let errors = (0..failures)
            .map(|i| StepError::Timeout(format!("scripted failure {}", i + 1)))
            .collect();
        Self::build(name, errors, false, output)
    }

    /// Returns the given errors in order, then succeeds.
    #[must_use]
    pub fn with_errors(
        name: impl Into<String>,
        errors: Vec<StepError>,
        output: StepOutput,
    ) -> Self {
        Self::build(name, errors, false, output)
    }

    /// Times out on every call.
    #[must_use]
    pub fn always_failing(name: impl Into<String>) -> Self {
        Self::build(name, Vec::new(), true, StepOutput::empty())
    }

    /// Number of times the step ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }

    /// The context seen on each call.
    #[must_use]
    pub fn contexts(&self) -> Vec<PipelineContext> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutput, StepError> {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        self.contexts.lock().push(ctx.clone());

        if let Some(err) = self.errors.lock().pop_front() {
            return Err(err);
        }
        if self.fail_forever {
            return Err(StepError::Timeout(format!("scripted failure {call}")));
        }
        Ok(self.output.clone())
    }
}

/// A sleeper that records each requested delay and returns at once.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested delays, in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    /// Requested delays in whole seconds.
    #[must_use]
    pub fn delay_secs(&self) -> Vec<u64> {
        self.delays.lock().iter().map(Duration::as_secs).collect()
    }

    /// Sum of requested delays.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobId;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn ctx() -> PipelineContext {
        PipelineContext::new(JobId::new(), BTreeMap::new())
    }

    #[tokio::test]
    async fn test_scripted_step_fails_then_succeeds() {
        let step = ScriptedStep::failing_then_ok("s", 2, StepOutput::value("k", json!(1)));
        assert!(step.run(&ctx()).await.is_err());
        assert!(step.run(&ctx()).await.is_err());
        assert_eq!(step.run(&ctx()).await.unwrap().get("k"), Some(&json!(1)));
        assert_eq!(step.call_count(), 3);
        assert_eq!(step.contexts().len(), 3);
    }

    #[tokio::test]
    async fn test_always_failing() {
        let step = ScriptedStep::always_failing("s");
        for _ in 0..5 {
            assert!(matches!(step.run(&ctx()).await, Err(StepError::Timeout(_))));
        }
    }

    #[tokio::test]
    async fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(2)).await;
        sleeper.sleep(Duration::from_secs(4)).await;
        assert_eq!(sleeper.delay_secs(), vec![2, 4]);
        assert_eq!(sleeper.total(), Duration::from_secs(6));
    }
}
