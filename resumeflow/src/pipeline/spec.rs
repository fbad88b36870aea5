//! Step specifications.

use crate::steps::Step;
use std::sync::Arc;

/// One position in a pipeline: the step and its failure policy.
#[derive(Debug, Clone)]
pub struct StepSpec {
    /// The step implementation.
    pub step: Arc<dyn Step>,
    /// Whether a fallback may be substituted once retries run out.
    pub allow_fallback: bool,
}

impl StepSpec {
    /// Creates a spec that permits fallback.
    #[must_use]
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self {
            step,
            allow_fallback: true,
        }
    }

    /// Forbids fallback: exhausting retries fails the job.
    #[must_use]
    pub fn without_fallback(mut self) -> Self {
        self.allow_fallback = false;
        self
    }

    /// Sets whether fallback is permitted.
    #[must_use]
    pub fn with_allow_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = allow;
        self
    }

    /// The step name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.step.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepOutput;
    use crate::steps::FnStep;

    #[test]
    fn test_step_spec_defaults_to_fallback_allowed() {
        let spec = StepSpec::new(Arc::new(FnStep::new("render", |_| Ok(StepOutput::empty()))));
        assert_eq!(spec.name(), "render");
        assert!(spec.allow_fallback);
        assert!(!spec.clone().without_fallback().allow_fallback);
        assert!(!spec.with_allow_fallback(false).allow_fallback);
    }
}
