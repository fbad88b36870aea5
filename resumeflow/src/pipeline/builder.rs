//! Pipeline builder with validation.

use super::StepSpec;
use crate::errors::PipelineValidationError;
use crate::steps::Step;
use std::collections::HashSet;
use std::sync::Arc;

/// A validated, fixed step sequence.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<StepSpec>,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; an empty pipeline cannot be built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&StepSpec> {
        self.steps.get(index)
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    /// Step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(StepSpec::name).collect()
    }
}

/// Builder for creating validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<StepSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step that may fall back.
    #[must_use]
    pub fn step(self, step: Arc<dyn Step>) -> Self {
        self.add(StepSpec::new(step))
    }

    /// Appends a step that fails the job once its retries are spent.
    #[must_use]
    pub fn step_without_fallback(self, step: Arc<dyn Step>) -> Self {
        self.add(StepSpec::new(step).without_fallback())
    }

    /// Appends a step specification.
    #[must_use]
    pub fn add(mut self, spec: StepSpec) -> Self {
        self.steps.push(spec);
        self
    }

    /// Returns the number of steps added so far.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline name is blank, there are no steps,
    /// a step name is blank or two steps share a name.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }
        if self.steps.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for (index, spec) in self.steps.iter().enumerate() {
            let name = spec.name();
            if name.trim().is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Step {index} has an empty name"
                )));
            }
            if !seen.insert(name) {
                return Err(PipelineValidationError::new(format!(
                    "Duplicate step name '{name}'"
                ))
                .with_steps(vec![name.to_string()]));
            }
        }

        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepOutput;
    use crate::steps::FnStep;

    fn noop(name: &str) -> Arc<dyn Step> {
        Arc::new(FnStep::new(name, |_| Ok(StepOutput::empty())))
    }

    #[test]
    fn test_build_preserves_order_and_policy() {
        let pipeline = PipelineBuilder::new("video")
            .step(noop("script"))
            .step(noop("animation"))
            .step_without_fallback(noop("render"))
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "video");
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline.step_names(), vec!["script", "animation", "render"]);
        assert!(pipeline.get(0).unwrap().allow_fallback);
        assert!(!pipeline.get(2).unwrap().allow_fallback);
        assert!(pipeline.get(3).is_none());
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineBuilder::new("video").build().unwrap_err();
        assert!(err.message.contains("no steps"));
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(PipelineBuilder::new("  ").step(noop("a")).build().is_err());
        assert!(PipelineBuilder::new("p").step(noop(" ")).build().is_err());
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let err = PipelineBuilder::new("video")
            .step(noop("script"))
            .step(noop("script"))
            .build()
            .unwrap_err();
        assert_eq!(err.steps, vec!["script".to_string()]);
    }
}
