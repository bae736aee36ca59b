//! Outbound sync notifications

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Error;
use crate::models::{SyncConflict, TaskRecord};

/// Outcome of one sync attempt as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub success: bool,
    pub error: Option<String>,
    pub last_sync_time: DateTime<Utc>,
}

impl SyncStatus {
    pub const fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            error: None,
            last_sync_time: at,
        }
    }

    pub fn failed(error: &Error, at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            last_sync_time: at,
        }
    }
}

/// Event broadcast by [`super::SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The local collection was replaced by a merge result
    RecordsUpdated(Vec<TaskRecord>),
    /// A session finished, successfully or not
    Status(SyncStatus),
}

/// Result of a successful sync session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Merged collection now held both locally and remotely
    pub records: Vec<TaskRecord>,
    /// Diverged records found when the remote had moved since the last sync
    pub conflicts: Vec<SyncConflict>,
    /// Remote version the merge was based on
    pub remote_version: u64,
    /// Version written back to the remote
    pub written_version: u64,
    /// Whether the remote document had to be created first
    pub created_document: bool,
    /// Merge attempts, more than one when the remote moved mid-session
    pub attempts: u32,
    pub synced_at: DateTime<Utc>,
}
