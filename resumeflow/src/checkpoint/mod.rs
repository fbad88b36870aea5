//! Durable checkpoints of working state, keyed by `(job_id, step_index)`.
//!
//! At most one checkpoint exists per key; a new save overwrites the old
//! one. Saves are atomic from the caller's view: a partially written
//! snapshot is never returned by [`CheckpointStore::load`].

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

use crate::context::ContextSnapshot;
use crate::core::{CheckpointRef, JobId};
use crate::errors::CheckpointError;
use async_trait::async_trait;

/// Storage contract for checkpoints.
///
/// Implementations must be safe to share across workers; access for one
/// job id is effectively single-writer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stores `snapshot` under `(job_id, step_index)`, replacing any prior value.
    async fn save(
        &self,
        job_id: JobId,
        step_index: usize,
        snapshot: &ContextSnapshot,
    ) -> Result<CheckpointRef, CheckpointError>;

    /// Loads the snapshot stored under `(job_id, step_index)`.
    ///
    /// Returns [`CheckpointError::NotFound`] when nothing is stored.
    async fn load(&self, job_id: JobId, step_index: usize)
        -> Result<ContextSnapshot, CheckpointError>;

    /// Step indices with a stored checkpoint, ascending.
    async fn list(&self, job_id: JobId) -> Result<Vec<usize>, CheckpointError>;

    /// Removes every checkpoint of the job, returning how many were removed.
    async fn delete_all(&self, job_id: JobId) -> Result<usize, CheckpointError>;
}

/// Builds the reference returned by a successful save.
fn checkpoint_ref(job_id: JobId, step_index: usize, snapshot: &ContextSnapshot) -> CheckpointRef {
    CheckpointRef {
        job_id,
        step_index,
        digest: snapshot.digest(),
    }
}
