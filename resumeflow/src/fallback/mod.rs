//! Fallback substitutes for steps whose live execution permanently failed.
//!
//! A fallback trades fidelity for completion: it returns a fixed, always
//! valid placeholder of the step's output shape. Providers perform no I/O.
//! Any use of a fallback puts the job in degraded mode.

use crate::context::PipelineContext;
use crate::core::StepOutput;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Raised when no substitute can be produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FallbackError {
    /// No fallback is registered for the step.
    #[error("no fallback registered for step {0}")]
    NotRegistered(usize),
}

/// Supplies substitute results for failed steps.
pub trait FallbackProvider: Send + Sync {
    /// Returns the substitute output for `step_index`.
    fn get_fallback(
        &self,
        step_index: usize,
        ctx: &PipelineContext,
    ) -> Result<StepOutput, FallbackError>;
}

type DeriveFn = Arc<dyn Fn(&PipelineContext) -> StepOutput + Send + Sync>;

#[derive(Clone)]
enum FallbackEntry {
    Fixed(StepOutput),
    Derived(DeriveFn),
}

/// Fallbacks registered per step index.
#[derive(Clone, Default)]
pub struct StaticFallbackProvider {
    entries: HashMap<usize, FallbackEntry>,
}

impl StaticFallbackProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constant substitute.
    #[must_use]
    pub fn with_fixed(mut self, step_index: usize, output: StepOutput) -> Self {
        self.entries.insert(step_index, FallbackEntry::Fixed(output));
        self
    }

    /// Registers a substitute computed from the working state. The function
    /// must be pure and infallible.
    #[must_use]
    pub fn with_derived<F>(mut self, step_index: usize, derive: F) -> Self
    where
        F: Fn(&PipelineContext) -> StepOutput + Send + Sync + 'static,
    {
        self.entries
            .insert(step_index, FallbackEntry::Derived(Arc::new(derive)));
        self
    }

    /// Returns true if a fallback exists for the step.
    #[must_use]
    pub fn has_fallback(&self, step_index: usize) -> bool {
        self.entries.contains_key(&step_index)
    }

    /// Registered step indices, ascending.
    #[must_use]
    pub fn steps(&self) -> Vec<usize> {
        let mut steps: Vec<usize> = self.entries.keys().copied().collect();
        steps.sort_unstable();
        steps
    }
}

impl fmt::Debug for StaticFallbackProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticFallbackProvider")
            .field("steps", &self.steps())
            .finish()
    }
}

impl FallbackProvider for StaticFallbackProvider {
    fn get_fallback(
        &self,
        step_index: usize,
        ctx: &PipelineContext,
    ) -> Result<StepOutput, FallbackError> {
        match self.entries.get(&step_index) {
            Some(FallbackEntry::Fixed(output)) => Ok(output.clone()),
            Some(FallbackEntry::Derived(derive)) => Ok(derive(ctx)),
            None => Err(FallbackError::NotRegistered(step_index)),
        }
    }
}

/// Provider with no fallbacks; every step fails permanently once its
/// retries are spent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallbacks;

impl FallbackProvider for NoFallbacks {
    fn get_fallback(
        &self,
        step_index: usize,
        _ctx: &PipelineContext,
    ) -> Result<StepOutput, FallbackError> {
        Err(FallbackError::NotRegistered(step_index))
    }
}

/// Stage positions of the canonical content-generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentStage {
    /// Narration script and scene breakdown.
    Script,
    /// Animation code for each scene.
    Animation,
    /// Supporting images.
    Imagery,
    /// Synthesized speech.
    Narration,
    /// Final video render and mux.
    Render,
}

impl ContentStage {
    /// Step index of the stage.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Script => 0,
            Self::Animation => 1,
            Self::Imagery => 2,
            Self::Narration => 3,
            Self::Render => 4,
        }
    }
}

/// Placeholders for the content-generation job.
///
/// Rendering has no substitute: a job without a rendered video produced
/// nothing usable.
#[must_use]
pub fn content_pipeline_fallbacks() -> StaticFallbackProvider {
    StaticFallbackProvider::new()
        .with_derived(ContentStage::Script.index(), |ctx| {
            let topic = ctx.get_str("topic").unwrap_or("this topic");
            StepOutput::value("script", json!(format!("An introduction to {topic}.")))
                .with_value(
                    "scenes",
                    json!([{
                        "title": topic,
                        "narration": format!("An introduction to {topic}."),
                    }]),
                )
        })
        .with_derived(ContentStage::Animation.index(), |ctx| {
            let scenes = ctx
                .get("scenes")
                .and_then(serde_json::Value::as_array)
                .map_or(1, Vec::len);
            let cards: Vec<_> = (0..scenes)
                .map(|i| json!({ "scene": i, "kind": "title_card" }))
                .collect();
            StepOutput::value("animations", json!(cards))
        })
        .with_fixed(
            ContentStage::Imagery.index(),
            StepOutput::value("images", json!([])),
        )
        .with_fixed(
            ContentStage::Narration.index(),
            StepOutput::value("audio_segments", json!([]))
                .with_value("narration_silent", json!(true)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobId;
    use std::collections::BTreeMap;

    fn ctx_with(key: &str, value: serde_json::Value) -> PipelineContext {
        PipelineContext::new(JobId::new(), BTreeMap::from([(key.to_string(), value)]))
    }

    #[test]
    fn test_fixed_fallback() {
        let provider = StaticFallbackProvider::new()
            .with_fixed(2, StepOutput::value("images", json!([])));
        let ctx = ctx_with("topic", json!("x"));

        let out = provider.get_fallback(2, &ctx).unwrap();
        assert_eq!(out.get("images"), Some(&json!([])));
        assert!(provider.has_fallback(2));
        assert!(!provider.has_fallback(1));
    }

    #[test]
    fn test_missing_fallback() {
        let provider = StaticFallbackProvider::new();
        let ctx = ctx_with("topic", json!("x"));
        assert_eq!(
            provider.get_fallback(7, &ctx).unwrap_err(),
            FallbackError::NotRegistered(7)
        );
        assert!(NoFallbacks.get_fallback(0, &ctx).is_err());
    }

    #[test]
    fn test_content_script_fallback_uses_topic() {
        let provider = content_pipeline_fallbacks();
        let ctx = ctx_with("topic", json!("photosynthesis"));

        let out = provider.get_fallback(ContentStage::Script.index(), &ctx).unwrap();
        assert_eq!(out.get("script"), Some(&json!("An introduction to photosynthesis.")));
        assert_eq!(out.get("scenes").and_then(|s| s.as_array()).map(Vec::len), Some(1));
    }

    #[test]
    fn test_content_animation_fallback_matches_scene_count() {
        let provider = content_pipeline_fallbacks();
        let ctx = ctx_with("scenes", json!([{}, {}, {}]));

        let out = provider.get_fallback(ContentStage::Animation.index(), &ctx).unwrap();
        assert_eq!(out.get("animations").and_then(|a| a.as_array()).map(Vec::len), Some(3));
    }

    #[test]
    fn test_content_render_has_no_fallback() {
        let provider = content_pipeline_fallbacks();
        assert_eq!(provider.steps(), vec![0, 1, 2, 3]);
        assert!(!provider.has_fallback(ContentStage::Render.index()));
    }
}
