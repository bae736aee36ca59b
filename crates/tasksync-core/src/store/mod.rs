//! Local key/value storage for task records and sync metadata.
//!
//! The sync engine only sees the [`LocalStore`] trait. Every write notifies
//! subscribed listeners, including writes made by the engine itself, so
//! listeners that react to edits must be able to tell those apart.

mod memory;
mod migrations;
mod sqlite;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{SyncMetadata, TaskRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Key holding the task collection
pub const TASKS_KEY: &str = "tasks";
/// Key holding the remote version last observed
pub const LAST_SYNC_VERSION_KEY: &str = "lastSyncVersion";
/// Key holding the time of the last successful sync
pub const LAST_SYNC_TIME_KEY: &str = "lastSyncTime";

/// Keys and values read from or written to a store
pub type StoreValues = BTreeMap<String, Value>;

/// Callback invoked after every store write
pub type ChangeHandler = Arc<dyn Fn(&StoreChange) + Send + Sync>;

/// Keys written by one `set` call, with their new values
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub changes: StoreValues,
}

impl StoreChange {
    pub fn touches(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }
}

/// Persistent key/value map owned by the host.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read the given keys; absent keys are omitted from the result
    async fn get(&self, keys: &[&str]) -> Result<StoreValues>;

    /// Write all values, then notify listeners
    async fn set(&self, values: StoreValues) -> Result<()>;

    /// Subscribe to writes; dropping the returned handle unsubscribes
    fn on_change(&self, handler: ChangeHandler) -> Subscription;

    /// Lock held across read-modify-write cycles of the task collection.
    ///
    /// Plain `get`/`set` calls do not take it.
    fn write_lock(&self) -> &tokio::sync::Mutex<()>;
}

/// Listener registry shared by store implementations.
#[derive(Default)]
pub struct ChangeListeners {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, ChangeHandler)>>,
}

impl ChangeListeners {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(self: &Arc<Self>, handler: ChangeHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        Subscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    /// Invoke every handler. Handlers run outside the registry lock so they
    /// may subscribe or unsubscribe.
    pub fn notify(&self, change: &StoreChange) {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect::<Vec<_>>();
        for handler in handlers {
            handler(change);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(handler_id, _)| *handler_id != id);
    }
}

/// Unsubscribe token returned by [`LocalStore::on_change`].
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ChangeListeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Local collection plus sync bookkeeping, read in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub tasks: Vec<TaskRecord>,
    pub metadata: SyncMetadata,
}

pub async fn load_tasks(store: &dyn LocalStore) -> Result<Vec<TaskRecord>> {
    let values = store.get(&[TASKS_KEY]).await?;
    decode_tasks(values.get(TASKS_KEY))
}

pub async fn save_tasks(store: &dyn LocalStore, tasks: &[TaskRecord]) -> Result<()> {
    let mut values = StoreValues::new();
    values.insert(TASKS_KEY.to_string(), serde_json::to_value(tasks)?);
    store.set(values).await
}

pub async fn load_snapshot(store: &dyn LocalStore) -> Result<LocalSnapshot> {
    let values = store
        .get(&[TASKS_KEY, LAST_SYNC_VERSION_KEY, LAST_SYNC_TIME_KEY])
        .await?;

    let last_sync_version = match values.get(LAST_SYNC_VERSION_KEY) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_u64().ok_or_else(|| {
            Error::LocalStore(format!("stored {LAST_SYNC_VERSION_KEY} is not a version: {value}"))
        })?),
    };
    let last_sync_time = match values.get(LAST_SYNC_TIME_KEY) {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<DateTime<Utc>>(value.clone()).map_err(|error| {
                Error::LocalStore(format!("stored {LAST_SYNC_TIME_KEY} is invalid: {error}"))
            })?,
        ),
    };

    Ok(LocalSnapshot {
        tasks: decode_tasks(values.get(TASKS_KEY))?,
        metadata: SyncMetadata {
            last_sync_version,
            last_sync_time,
        },
    })
}

/// Persist a merge outcome and its bookkeeping in a single write.
pub async fn save_sync_result(
    store: &dyn LocalStore,
    tasks: &[TaskRecord],
    metadata: SyncMetadata,
) -> Result<()> {
    let mut values = StoreValues::new();
    values.insert(TASKS_KEY.to_string(), serde_json::to_value(tasks)?);
    values.insert(
        LAST_SYNC_VERSION_KEY.to_string(),
        serde_json::to_value(metadata.last_sync_version)?,
    );
    values.insert(
        LAST_SYNC_TIME_KEY.to_string(),
        serde_json::to_value(metadata.last_sync_time)?,
    );
    store.set(values).await
}

fn decode_tasks(value: Option<&Value>) -> Result<Vec<TaskRecord>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|error| {
            Error::LocalStore(format!("stored task collection is invalid: {error}"))
        }),
    }
}
