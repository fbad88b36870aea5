//! Step trait and implementations.
//!
//! Steps are the units of work in a job. Each consumes the working state
//! produced by the steps before it and returns a [`StepOutput`], or a
//! [`StepError`] when it fails.

use crate::context::PipelineContext;
use crate::core::StepOutput;
use crate::errors::StepError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;

/// Trait for pipeline steps.
///
/// A step may perform I/O and is responsible for its own timeouts: it
/// must return [`StepError::Timeout`] rather than hang. It must be safe
/// to run again after a checkpoint restore, overwriting rather than
/// appending whatever it produced before.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Runs the step against the current working state.
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutput, StepError>;
}

/// A simple function-based step.
pub struct FnStep<F>
where
    F: Fn(&PipelineContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&PipelineContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&PipelineContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&PipelineContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutput, StepError> {
        (self.func)(ctx)
    }
}

/// An async function-based step. The function receives an owned copy of
/// the working state.
pub struct AsyncFnStep<F, Fut>
where
    F: Fn(PipelineContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send,
{
    name: String,
    func: F,
    _phantom: std::marker::PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStep<F, Fut>
where
    F: Fn(PipelineContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send,
{
    /// Creates a new async function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStep<F, Fut>
where
    F: Fn(PipelineContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStep")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> Step for AsyncFnStep<F, Fut>
where
    F: Fn(PipelineContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutput, StepError> {
        (self.func)(ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobId;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn test_context() -> PipelineContext {
        PipelineContext::new(
            JobId::new(),
            BTreeMap::from([("topic".to_string(), json!("volcanoes"))]),
        )
    }

    #[tokio::test]
    async fn test_fn_step() {
        let step = FnStep::new("script", |ctx| {
            let topic = ctx
                .get_str("topic")
                .ok_or_else(|| StepError::Malformed("topic missing".into()))?;
            Ok(StepOutput::value("script", json!(format!("All about {topic}"))))
        });

        assert_eq!(step.name(), "script");

        let output = step.run(&test_context()).await.unwrap();
        assert_eq!(output.get("script"), Some(&json!("All about volcanoes")));
    }

    #[tokio::test]
    async fn test_fn_step_error() {
        let step = FnStep::new("broken", |_ctx| Err(StepError::Timeout("tts".into())));
        let err = step.run(&test_context()).await.unwrap_err();
        assert!(matches!(err, StepError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_async_fn_step() {
        let step = AsyncFnStep::new("images", |ctx: PipelineContext| async move {
            tokio::task::yield_now().await;
            let topic = ctx.get_str("topic").unwrap_or_default().to_string();
            Ok(StepOutput::value("images", json!([format!("{topic}.png")])))
        });

        let output = step.run(&test_context()).await.unwrap();
        assert_eq!(output.get("images"), Some(&json!(["volcanoes.png"])));
        assert!(format!("{step:?}").contains("images"));
    }
}
