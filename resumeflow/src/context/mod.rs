//! Working state for a job and its serialized snapshots.

mod execution;
mod snapshot;

pub use execution::PipelineContext;
pub use snapshot::ContextSnapshot;
