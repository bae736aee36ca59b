//! Sync engine: merge, conflict detection, sessions and their scheduling.

pub mod conflict;
pub mod merge;
mod scheduler;
mod session;
mod status;

pub use conflict::{find_conflicts, ConflictDetector, FieldConflictDetector};
pub use merge::merge;
pub use scheduler::{SyncRun, SyncScheduler};
pub use session::SyncEngine;
pub use status::{SyncEvent, SyncReport, SyncStatus};
