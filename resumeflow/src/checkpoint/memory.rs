//! In-memory checkpoint store.

use super::{checkpoint_ref, CheckpointStore};
use crate::context::ContextSnapshot;
use crate::core::{CheckpointRef, JobId};
use crate::errors::CheckpointError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Process-local checkpoint store for tests and single-process workers.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: DashMap<(JobId, usize), ContextSnapshot>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored checkpoints across all jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(
        &self,
        job_id: JobId,
        step_index: usize,
        snapshot: &ContextSnapshot,
    ) -> Result<CheckpointRef, CheckpointError> {
        self.entries.insert((job_id, step_index), snapshot.clone());
        Ok(checkpoint_ref(job_id, step_index, snapshot))
    }

    async fn load(
        &self,
        job_id: JobId,
        step_index: usize,
    ) -> Result<ContextSnapshot, CheckpointError> {
        self.entries
            .get(&(job_id, step_index))
            .map(|entry| entry.value().clone())
            .ok_or(CheckpointError::NotFound { job_id, step_index })
    }

    async fn list(&self, job_id: JobId) -> Result<Vec<usize>, CheckpointError> {
        let mut steps: Vec<usize> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == job_id)
            .map(|entry| entry.key().1)
            .collect();
        steps.sort_unstable();
        Ok(steps)
    }

    async fn delete_all(&self, job_id: JobId) -> Result<usize, CheckpointError> {
        let keys: Vec<(JobId, usize)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == job_id)
            .map(|entry| *entry.key())
            .collect();
        Ok(keys
            .into_iter()
            .filter(|key| self.entries.remove(key).is_some())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(bytes: &[u8]) -> ContextSnapshot {
        ContextSnapshot::from_bytes(bytes.to_vec())
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryCheckpointStore::new();
        let job = JobId::new();

        let r = store.save(job, 0, &snap(b"zero")).await.unwrap();
        assert_eq!(r.step_index, 0);
        assert_eq!(r.digest, snap(b"zero").digest());

        let loaded = store.load(job, 0).await.unwrap();
        assert_eq!(loaded.as_bytes(), b"zero");
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = InMemoryCheckpointStore::new();
        let job = JobId::new();

        store.save(job, 1, &snap(b"old")).await.unwrap();
        store.save(job, 1, &snap(b"new")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.load(job, 1).await.unwrap().as_bytes(), b"new");
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = InMemoryCheckpointStore::new();
        let job = JobId::new();
        let err = store.load(job, 3).await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound { step_index: 3, .. }));
    }

    #[tokio::test]
    async fn test_delete_all_only_touches_one_job() {
        let store = InMemoryCheckpointStore::new();
        let a = JobId::new();
        let b = JobId::new();

        store.save(a, 0, &snap(b"a0")).await.unwrap();
        store.save(a, 1, &snap(b"a1")).await.unwrap();
        store.save(b, 0, &snap(b"b0")).await.unwrap();

        assert_eq!(store.list(a).await.unwrap(), vec![0, 1]);
        assert_eq!(store.delete_all(a).await.unwrap(), 2);
        assert!(store.list(a).await.unwrap().is_empty());
        assert_eq!(store.list(b).await.unwrap(), vec![0]);
        assert_eq!(store.delete_all(a).await.unwrap(), 0);
    }
}
