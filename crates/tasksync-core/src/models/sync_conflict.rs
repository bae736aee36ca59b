//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::{TaskId, TaskRecord};

/// Which copy of a conflicting record survives the merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSide {
    Local,
    Remote,
}

/// A task whose authored fields differ between the local and remote copies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: TaskId,
    pub local: TaskRecord,
    pub remote: TaskRecord,
}

impl SyncConflict {
    /// Side kept by last-writer-wins (ties keep local)
    pub const fn winner(&self) -> ConflictSide {
        if self.remote.timestamp > self.local.timestamp {
            ConflictSide::Remote
        } else {
            ConflictSide::Local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: i64) -> TaskRecord {
        TaskRecord {
            timestamp,
            ..TaskRecord::new("task", "2024-05-01")
        }
    }

    #[test]
    fn winner_prefers_newer_and_local_on_tie() {
        let newer_remote = SyncConflict {
            id: "1".into(),
            local: record(100),
            remote: record(200),
        };
        assert_eq!(newer_remote.winner(), ConflictSide::Remote);

        let tie = SyncConflict {
            id: "1".into(),
            local: record(100),
            remote: record(100),
        };
        assert_eq!(tie.winner(), ConflictSide::Local);
    }
}
