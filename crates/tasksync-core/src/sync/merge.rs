//! Last-writer-wins merge of two task collections.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::models::{TaskId, TaskRecord};

/// Merge `local` and `remote` by id, keeping the copy with the greater
/// `timestamp` (ties keep local).
///
/// Records present on only one side are carried over unchanged. The result
/// is ordered most-recently-touched first, ties broken by id.
pub fn merge(local: &[TaskRecord], remote: &[TaskRecord]) -> Vec<TaskRecord> {
    let mut merged: HashMap<&TaskId, &TaskRecord> =
        local.iter().map(|record| (&record.id, record)).collect();

    for record in remote {
        match merged.entry(&record.id) {
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
            Entry::Occupied(mut entry) => {
                if record.timestamp > entry.get().timestamp {
                    entry.insert(record);
                }
            }
        }
    }

    let mut records = merged.into_values().cloned().collect::<Vec<_>>();
    sort_for_display(&mut records);
    records
}

/// Order records by descending timestamp, then ascending id
pub fn sort_for_display(records: &mut [TaskRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}
