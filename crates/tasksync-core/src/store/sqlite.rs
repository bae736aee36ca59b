//! SQLite-backed local store

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{
    migrations, ChangeHandler, ChangeListeners, LocalStore, StoreChange, StoreValues,
    Subscription, TASKS_KEY,
};
use crate::error::{Error, Result};
use crate::util::unix_millis_now;

/// Durable [`LocalStore`] keeping each key as a JSON text row.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    listeners: Arc<ChangeListeners>,
    write_lock: Mutex<()>,
    /// `PRAGMA data_version` last seen on this connection
    data_version: AtomicI64,
}

impl SqliteStore {
    /// Open a store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::configure(&conn)?;
        migrations::run(&conn)?;
        let data_version = read_data_version(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            listeners: ChangeListeners::new(),
            write_lock: Mutex::new(()),
            data_version: AtomicI64::new(data_version),
        })
    }

    /// Poll the database every `interval` and notify listeners when another
    /// connection (usually another process) committed a write.
    ///
    /// The task ends when the handle is aborted or the store is dropped.
    /// Returns `None` outside a Tokio runtime.
    pub fn watch_external_changes(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            warn!("Ignoring zero external change poll interval");
            return None;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, not watching for external changes");
            return None;
        };
        Some(runtime.spawn(poll_external_changes(Arc::downgrade(self), interval)))
    }

    /// Notify listeners with the current task collection if another
    /// connection wrote since the last check. Own writes are not reported.
    async fn check_external_change(&self) -> Result<bool> {
        let changes = {
            let conn = self.conn.lock().await;
            let version = read_data_version(&conn)?;
            if self.data_version.swap(version, Ordering::SeqCst) == version {
                return Ok(false);
            }

            let raw: Option<String> = conn
                .query_row("SELECT value FROM kv WHERE key = ?", params![TASKS_KEY], |row| {
                    row.get(0)
                })
                .optional()?;
            let mut changes = StoreValues::new();
            if let Some(raw) = raw {
                let value = serde_json::from_str(&raw).map_err(|error| {
                    Error::LocalStore(format!("value for '{TASKS_KEY}' is not valid JSON: {error}"))
                })?;
                changes.insert(TASKS_KEY.to_string(), value);
            }
            changes
        };

        debug!("Database changed by another connection");
        if !changes.is_empty() {
            self.listeners.notify(&StoreChange { changes });
        }
        Ok(true)
    }

    fn configure(conn: &Connection) -> Result<()> {
        // In-memory databases report "memory" here; either way the pragma is harmless
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreValues> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT value FROM kv WHERE key = ?")?;

        let mut values = StoreValues::new();
        for key in keys {
            let raw: Option<String> = stmt
                .query_row(params![key], |row| row.get(0))
                .optional()?;
            if let Some(raw) = raw {
                let value = serde_json::from_str(&raw).map_err(|error| {
                    Error::LocalStore(format!("value for '{key}' is not valid JSON: {error}"))
                })?;
                values.insert((*key).to_string(), value);
            }
        }
        Ok(values)
    }

    async fn set(&self, values: StoreValues) -> Result<()> {
        {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                )?;
                let now = unix_millis_now();
                for (key, value) in &values {
                    stmt.execute(params![key, serde_json::to_string(value)?, now])?;
                }
            }
            tx.commit()?;
        }

        self.listeners.notify(&StoreChange { changes: values });
        Ok(())
    }

    fn on_change(&self, handler: ChangeHandler) -> Subscription {
        self.listeners.subscribe(handler)
    }

    fn write_lock(&self) -> &Mutex<()> {
        &self.write_lock
    }
}

fn read_data_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

async fn poll_external_changes(store: Weak<SqliteStore>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(store) = store.upgrade() else {
            break;
        };
        if let Err(error) = store.check_external_change().await {
            warn!("Checking for external changes failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::models::TaskRecord;
    use crate::store::{load_tasks, save_tasks};

    #[tokio::test]
    async fn test_set_and_get_in_memory() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut values = StoreValues::new();
        values.insert("lastSyncVersion".into(), json!(4));
        store.set(values).await.unwrap();

        let read = store.get(&["lastSyncVersion", "missing"]).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read["lastSyncVersion"], json!(4));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = SqliteStore::open_in_memory().unwrap();
        for version in [1, 2] {
            let mut values = StoreValues::new();
            values.insert("lastSyncVersion".into(), json!(version));
            store.set(values).await.unwrap();
        }
        let read = store.get(&["lastSyncVersion"]).await.unwrap();
        assert_eq!(read["lastSyncVersion"], json!(2));
    }

    #[tokio::test]
    async fn test_tasks_persist_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("tasks.db");
        let tasks = vec![TaskRecord::new("water plants", "2024-05-01")];

        {
            let store = SqliteStore::open(&path).unwrap();
            save_tasks(&store, &tasks).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(load_tasks(&reopened).await.unwrap(), tasks);
    }

    #[tokio::test]
    async fn test_writes_from_other_connection_are_reported() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("tasks.db");
        let watcher = SqliteStore::open(&path).unwrap();
        let other = SqliteStore::open(&path).unwrap();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = watcher.on_change(Arc::new(move |change: &StoreChange| {
            sink.lock().unwrap().push(change.clone());
        }));

        assert!(!watcher.check_external_change().await.unwrap());

        let tasks = vec![TaskRecord::new("added elsewhere", "2024-05-01")];
        save_tasks(&other, &tasks).await.unwrap();
        assert!(watcher.check_external_change().await.unwrap());
        assert!(!watcher.check_external_change().await.unwrap());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].touches(TASKS_KEY));
        assert_eq!(seen[0].changes[TASKS_KEY], serde_json::to_value(&tasks).unwrap());
    }

    #[tokio::test]
    async fn test_own_writes_are_not_reported_as_external() {
        let store = SqliteStore::open_in_memory().unwrap();
        save_tasks(&store, &[TaskRecord::new("local", "2024-05-01")])
            .await
            .unwrap();
        assert!(!store.check_external_change().await.unwrap());
    }

    #[tokio::test]
    async fn test_watcher_polls_until_aborted() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("tasks.db");
        let watcher = Arc::new(SqliteStore::open(&path).unwrap());
        let other = SqliteStore::open(&path).unwrap();

        let seen = Arc::new(StdMutex::new(0_usize));
        let sink = Arc::clone(&seen);
        let _subscription = watcher.on_change(Arc::new(move |_: &StoreChange| {
            *sink.lock().unwrap() += 1;
        }));
        let handle = watcher
            .watch_external_changes(Duration::from_millis(20))
            .unwrap();

        save_tasks(&other, &[TaskRecord::new("from cli", "2024-05-01")])
            .await
            .unwrap();
        for _ in 0..100 {
            if *seen.lock().unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(*seen.lock().unwrap(), 1);

        handle.abort();
        assert!(watcher
            .watch_external_changes(Duration::ZERO)
            .is_none());
    }
}
