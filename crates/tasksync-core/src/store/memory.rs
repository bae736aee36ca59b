//! In-memory store, used by tests and embedders without durable storage

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{ChangeHandler, ChangeListeners, LocalStore, StoreChange, StoreValues, Subscription};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<StoreValues>,
    listeners: Arc<ChangeListeners>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    write_lock: tokio::sync::Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with [`Error::LocalStore`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreValues> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|key| {
                values
                    .get(*key)
                    .map(|value| ((*key).to_string(), value.clone()))
            })
            .collect())
    }

    async fn set(&self, values: StoreValues) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::LocalStore("memory store rejected write".into()));
        }

        {
            let mut stored = self.values.lock().unwrap_or_else(PoisonError::into_inner);
            for (key, value) in &values {
                stored.insert(key.clone(), value.clone());
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        self.listeners.notify(&StoreChange { changes: values });
        Ok(())
    }

    fn on_change(&self, handler: ChangeHandler) -> Subscription {
        self.listeners.subscribe(handler)
    }

    fn write_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.write_lock
    }
}
