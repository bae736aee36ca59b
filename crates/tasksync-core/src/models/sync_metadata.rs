//! Local sync bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote version last observed by this device and when.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub last_sync_version: Option<u64>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncMetadata {
    /// Whether the remote has been written by someone else since we last looked.
    ///
    /// A device that never synced has nothing to be stale against.
    pub fn is_behind(&self, remote_version: u64) -> bool {
        self.last_sync_version
            .is_some_and(|last_version| remote_version > last_version)
    }
}
