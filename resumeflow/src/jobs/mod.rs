//! Job record storage and worker leases.
//!
//! The job store is, with the checkpoint store, the only state shared
//! between workers. Access is keyed by job id; a lease ensures a single
//! worker drives a given job at a time.

mod memory;

pub use memory::InMemoryJobStore;

use crate::core::{Job, JobId, JobStatus};
use crate::errors::JobStoreError;
use async_trait::async_trait;

/// Storage contract for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job. Fails if the id already exists.
    async fn create(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Reads a job.
    async fn get(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    /// Replaces a stored job with `job`.
    ///
    /// A job already stored in a terminal status may only be rewritten with
    /// that same status.
    async fn save(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Jobs currently in `status`.
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, JobStoreError>;

    /// Takes the worker lease on a job. Returns false if another worker holds it.
    fn try_claim(&self, job_id: JobId) -> bool;

    /// Releases the worker lease.
    fn release(&self, job_id: JobId);
}

/// RAII worker lease; released on drop.
pub struct JobLease<'a> {
    store: &'a dyn JobStore,
    job_id: JobId,
}

impl<'a> JobLease<'a> {
    /// Claims the lease, or returns `None` if it is held elsewhere.
    #[must_use]
    pub fn acquire(store: &'a dyn JobStore, job_id: JobId) -> Option<Self> {
        // Built lazily: a lease constructed on failure would release the
        // other worker's claim when dropped.
        store.try_claim(job_id).then(|| Self { store, job_id })
    }

    /// The leased job.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl Drop for JobLease<'_> {
    fn drop(&mut self) {
        self.store.release(self.job_id);
    }
}

impl std::fmt::Debug for JobLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLease")
            .field("job_id", &self.job_id)
            .finish()
    }
}
