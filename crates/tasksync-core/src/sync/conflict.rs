//! Detection of records edited on both sides since the last sync.

use std::collections::HashMap;

use crate::models::{SyncConflict, TaskId, TaskRecord};

/// Strategy classifying which shared records diverged.
///
/// Detection is informational only: the merge still resolves every pair by
/// timestamp.
pub trait ConflictDetector: Send + Sync {
    fn find_conflicts(&self, local: &[TaskRecord], remote: &[TaskRecord]) -> Vec<SyncConflict>;
}

/// Flags records whose user-authored fields differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldConflictDetector;

impl ConflictDetector for FieldConflictDetector {
    fn find_conflicts(&self, local: &[TaskRecord], remote: &[TaskRecord]) -> Vec<SyncConflict> {
        find_conflicts(local, remote)
    }
}

/// Records present on both sides whose `text`, `reminder`, `date` or
/// `completed` differ, in local order.
pub fn find_conflicts(local: &[TaskRecord], remote: &[TaskRecord]) -> Vec<SyncConflict> {
    let remote_by_id: HashMap<&TaskId, &TaskRecord> =
        remote.iter().map(|record| (&record.id, record)).collect();

    local
        .iter()
        .filter_map(|record| {
            let other = remote_by_id.get(&record.id)?;
            fields_differ(record, other).then(|| SyncConflict {
                id: record.id.clone(),
                local: record.clone(),
                remote: (*other).clone(),
            })
        })
        .collect()
}

fn fields_differ(a: &TaskRecord, b: &TaskRecord) -> bool {
    a.text != b.text || a.reminder != b.reminder || a.date != b.date || a.completed != b.completed
}
