//! Data models for tasksync

mod document;
mod sync_conflict;
mod sync_metadata;
mod task;

pub use document::{RemoteDocument, INITIAL_DOCUMENT_VERSION};
pub use sync_conflict::{ConflictSide, SyncConflict};
pub use sync_metadata::SyncMetadata;
pub use task::{
    current_time_of_day, normalize_date, normalize_reminder_time, today, TaskId, TaskRecord,
};
