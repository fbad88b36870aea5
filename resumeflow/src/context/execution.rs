//! Mutable working state threaded through a job's steps.

use super::ContextSnapshot;
use crate::core::{JobId, StepOutput};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The working state of one job.
///
/// Owned by the executor processing the job; it is never shared between
/// jobs, so it carries no locking. Each successful step merges its
/// [`StepOutput`] in, and the result is checkpointed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineContext {
    job_id: JobId,
    data: BTreeMap<String, serde_json::Value>,
    /// Key -> index of the step that last wrote it.
    produced_by: BTreeMap<String, usize>,
    /// Steps whose output came from a fallback.
    #[serde(default)]
    fallback_steps: BTreeSet<usize>,
    last_step: Option<usize>,
}

impl PipelineContext {
    /// Creates a context seeded with the job's input data.
    #[must_use]
    pub fn new(job_id: JobId, input: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            job_id,
            data: input,
            produced_by: BTreeMap::new(),
            fallback_steps: BTreeSet::new(),
            last_step: None,
        }
    }

    /// Returns the owning job id.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Gets a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Gets a value and deserializes it.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        self.data
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
    }

    /// Gets a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns all working data.
    #[must_use]
    pub fn data(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.data
    }

    /// Index of the step that last wrote `key`.
    #[must_use]
    pub fn producer_of(&self, key: &str) -> Option<usize> {
        self.produced_by.get(key).copied()
    }

    /// Returns true if the step's output was a fallback substitute.
    #[must_use]
    pub fn is_fallback(&self, step_index: usize) -> bool {
        self.fallback_steps.contains(&step_index)
    }

    /// Last step merged into this context.
    #[must_use]
    pub fn last_step(&self) -> Option<usize> {
        self.last_step
    }

    /// Merges a step's output. Existing keys are overwritten, so re-running
    /// a step after a restore replaces rather than appends.
    pub fn apply(&mut self, step_index: usize, output: &StepOutput, fallback: bool) {
        for (key, value) in &output.data {
            self.data.insert(key.clone(), value.clone());
            self.produced_by.insert(key.clone(), step_index);
        }
        if fallback {
            self.fallback_steps.insert(step_index);
        } else {
            self.fallback_steps.remove(&step_index);
        }
        self.last_step = Some(self.last_step.map_or(step_index, |last| last.max(step_index)));
    }

    /// Serializes the context into a snapshot.
    pub fn snapshot(&self) -> Result<ContextSnapshot, serde_json::Error> {
        serde_json::to_vec(self).map(ContextSnapshot::from_bytes)
    }

    /// Rebuilds a context from a snapshot.
    pub fn restore(snapshot: &ContextSnapshot) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(snapshot.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn input() -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([("topic".to_string(), json!("tides"))])
    }

    #[test]
    fn test_new_context_holds_input() {
        let ctx = PipelineContext::new(JobId::new(), input());
        assert_eq!(ctx.get_str("topic"), Some("tides"));
        assert_eq!(ctx.last_step(), None);
        assert_eq!(ctx.producer_of("topic"), None);
    }

    #[test]
    fn test_apply_merges_and_overwrites() {
        let mut ctx = PipelineContext::new(JobId::new(), input());
        ctx.apply(0, &StepOutput::value("script", json!("v1")), false);
        ctx.apply(0, &StepOutput::value("script", json!("v2")), false);

        assert_eq!(ctx.get("script"), Some(&json!("v2")));
        assert_eq!(ctx.producer_of("script"), Some(0));
        assert_eq!(ctx.data().len(), 2);
    }

    #[test]
    fn test_apply_tracks_fallbacks() {
        let mut ctx = PipelineContext::new(JobId::new(), BTreeMap::new());
        ctx.apply(1, &StepOutput::value("images", json!([])), true);
        ctx.apply(0, &StepOutput::empty(), false);

        assert!(ctx.is_fallback(1));
        assert!(!ctx.is_fallback(0));
        assert_eq!(ctx.last_step(), Some(1));
    }

    #[test]
    fn test_get_as_typed() {
        let mut ctx = PipelineContext::new(JobId::new(), BTreeMap::new());
        ctx.apply(0, &StepOutput::value("scenes", json!([1, 2, 3])), false);

        let scenes: Vec<u32> = ctx.get_as("scenes").unwrap().unwrap();
        assert_eq!(scenes, vec![1, 2, 3]);
        assert!(ctx.get_as::<String>("scenes").unwrap().is_err());
        assert!(ctx.get_as::<String>("missing").is_none());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut ctx = PipelineContext::new(JobId::new(), input());
        ctx.apply(0, &StepOutput::value("script", json!("hello")), false);
        ctx.apply(1, &StepOutput::value("animation", json!({"frames": 24})), true);

        let snapshot = ctx.snapshot().unwrap();
        let restored = PipelineContext::restore(&snapshot).unwrap();
        assert_eq!(restored, ctx);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let snapshot = ContextSnapshot::from_bytes(b"{not json".to_vec());
        assert!(PipelineContext::restore(&snapshot).is_err());
    }
}
