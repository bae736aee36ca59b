//! Error types for tasksync-core

use thiserror::Error;

/// Result type alias using tasksync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tasksync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Credential unobtainable or rejected by the remote store
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Network or HTTP failure talking to the remote document store
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// Host storage failure
    #[error("Local store error: {0}")]
    LocalStore(String),

    /// Remote content does not match the expected document shape
    #[error("Malformed remote document: {0}")]
    MalformedDocument(String),

    /// Remote version kept moving between read and write
    #[error("Remote document changed during sync (expected version {expected}, found {found})")]
    VersionConflict { expected: u64, found: u64 },

    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Self::LocalStore(error.to_string())
    }
}

impl Error {
    /// Whether the next scheduled trigger may succeed without user action.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable(_) | Self::VersionConflict { .. }
        )
    }
}
