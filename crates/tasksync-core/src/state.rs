//! Shared cross-platform state types.

use crate::sync::SyncStatus;

/// Sync state shown by hosts (badge, status line).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No session has run yet
    #[default]
    Idle,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    pub const fn from_status(status: &SyncStatus) -> Self {
        if status.success {
            Self::Synced
        } else {
            Self::Error
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}
