//! File-backed checkpoint store.
//!
//! Layout: `<root>/<job_id>/step-<index>.json`. Each file is a JSON
//! envelope carrying the hex-encoded snapshot and its sha256 digest.
//! Writes go to a temp file in the same directory and are renamed into
//! place, so readers see either the old file or the new one. The digest
//! is verified on load.

use super::{checkpoint_ref, CheckpointStore};
use crate::context::ContextSnapshot;
use crate::core::{CheckpointRef, JobId, Timestamp};
use crate::errors::CheckpointError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const FILE_PREFIX: &str = "step-";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    job_id: JobId,
    step_index: usize,
    digest: String,
    saved_at: Timestamp,
    snapshot_hex: String,
}

/// Stores one file per checkpoint under a root directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    fn checkpoint_path(&self, job_id: JobId, step_index: usize) -> PathBuf {
        self.job_dir(job_id)
            .join(format!("{FILE_PREFIX}{step_index}{FILE_SUFFIX}"))
    }

    fn parse_step_index(file_name: &str) -> Option<usize> {
        file_name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?
            .parse()
            .ok()
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
        let dir = path
            .parent()
            .ok_or_else(|| CheckpointError::Backend(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(dir).await?;

        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("checkpoint");
        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        fs::write(&tmp, bytes).await?;
        if let Err(err) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(
        &self,
        job_id: JobId,
        step_index: usize,
        snapshot: &ContextSnapshot,
    ) -> Result<CheckpointRef, CheckpointError> {
        let reference = checkpoint_ref(job_id, step_index, snapshot);
        let envelope = Envelope {
            job_id,
            step_index,
            digest: reference.digest.clone(),
            saved_at: Utc::now(),
            snapshot_hex: hex::encode(snapshot.as_bytes()),
        };
        let bytes = serde_json::to_vec(&envelope)?;
        let path = self.checkpoint_path(job_id, step_index);
        Self::write_atomic(&path, &bytes).await?;

        tracing::debug!(
            job_id = %job_id,
            step_index,
            path = %path.display(),
            bytes = snapshot.len(),
            "Checkpoint written"
        );
        Ok(reference)
    }

    async fn load(
        &self,
        job_id: JobId,
        step_index: usize,
    ) -> Result<ContextSnapshot, CheckpointError> {
        let path = self.checkpoint_path(job_id, step_index);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                return Err(CheckpointError::NotFound { job_id, step_index });
            }
            Err(err) => return Err(err.into()),
        };

        let corrupt = |reason: String| CheckpointError::Corrupt {
            job_id,
            step_index,
            reason,
        };

        let envelope: Envelope =
            serde_json::from_slice(&raw).map_err(|e| corrupt(format!("bad envelope: {e}")))?;
        if envelope.job_id != job_id || envelope.step_index != step_index {
            return Err(corrupt(format!(
                "envelope key mismatch: {}/{}",
                envelope.job_id, envelope.step_index
            )));
        }

        let bytes = hex::decode(&envelope.snapshot_hex)
            .map_err(|e| corrupt(format!("bad snapshot encoding: {e}")))?;
        let snapshot = ContextSnapshot::from_bytes(bytes);
        if snapshot.digest() != envelope.digest {
            return Err(corrupt("digest mismatch".to_string()));
        }
        Ok(snapshot)
    }

    async fn list(&self, job_id: JobId) -> Result<Vec<usize>, CheckpointError> {
        let mut entries = match fs::read_dir(self.job_dir(job_id)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut steps = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(index) = entry.file_name().to_str().and_then(Self::parse_step_index) {
                steps.push(index);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    async fn delete_all(&self, job_id: JobId) -> Result<usize, CheckpointError> {
        let count = self.list(job_id).await?.len();
        match fs::remove_dir_all(self.job_dir(job_id)).await {
            Ok(()) => Ok(count),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}
