//! tasksync-core - Core library for tasksync
//!
//! This crate contains the task model, local stores, the remote document
//! client, and the sync engine used by every tasksync host (CLI, extension
//! bridge, tests).

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod state;
pub mod store;
pub mod sync;
pub mod tasks;
pub mod util;

pub use error::{Error, Result};
pub use models::{TaskId, TaskRecord};
pub use state::SyncState;
pub use sync::{SyncEngine, SyncEvent, SyncReport, SyncRun, SyncScheduler, SyncStatus};
pub use tasks::TaskList;
