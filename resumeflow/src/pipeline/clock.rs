//! The backoff sleep, behind a trait so tests can observe delays without
//! waiting for them.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Suspends the calling job between retry attempts.
///
/// Implementations must not block the thread: other jobs keep running
/// while one job backs off.
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
