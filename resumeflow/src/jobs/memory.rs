//! In-memory job store.

use super::JobStore;
use crate::core::{Job, JobId, JobStatus};
use crate::errors::JobStoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

/// Process-local job store. Each map shard locks independently, so
/// distinct jobs do not contend.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, Job>,
    leases: DashSet<JobId>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no jobs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Returns true if a worker holds the lease on the job.
    #[must_use]
    pub fn is_claimed(&self, job_id: JobId) -> bool {
        self.leases.contains(&job_id)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), JobStoreError> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(JobStoreError::AlreadyExists(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        self.jobs
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    async fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut stored = self
            .jobs
            .get_mut(&job.id)
            .ok_or(JobStoreError::NotFound(job.id))?;
        if stored.status.is_terminal() && stored.status != job.status {
            return Err(JobStoreError::Backend(format!(
                "job {} is {} and cannot become {}",
                job.id, stored.status, job.status
            )));
        }
        *stored = job.clone();
        Ok(())
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, JobStoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    fn try_claim(&self, job_id: JobId) -> bool {
        self.leases.insert(job_id)
    }

    fn release(&self, job_id: JobId) {
        self.leases.remove(&job_id);
    }
}
