//! Task-list operations on top of a [`LocalStore`].
//!
//! Every authored change bumps the record's `timestamp`, which is what the
//! merge uses to pick a winner across devices.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{normalize_date, normalize_reminder_time, TaskId, TaskRecord};
use crate::store::{self, LocalStore};
use crate::sync::merge::sort_for_display;
use crate::util::{next_timestamp, normalize_text_option};

/// Thread-safe handle for reading and editing the local task collection.
///
/// Edits hold the store's write lock, the same lock a sync session takes
/// while folding its result into the collection.
#[derive(Clone)]
pub struct TaskList {
    store: Arc<dyn LocalStore>,
}

impl TaskList {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// All tasks, most recently touched first
    pub async fn list(&self) -> Result<Vec<TaskRecord>> {
        let mut tasks = store::load_tasks(self.store.as_ref()).await?;
        sort_for_display(&mut tasks);
        Ok(tasks)
    }

    pub async fn list_for_date(&self, date: &str) -> Result<Vec<TaskRecord>> {
        let date = normalize_date(date)?;
        let mut tasks = self.list().await?;
        tasks.retain(|task| task.date == date);
        Ok(tasks)
    }

    pub async fn get(&self, id: &TaskId) -> Result<TaskRecord> {
        store::load_tasks(self.store.as_ref())
            .await?
            .into_iter()
            .find(|task| &task.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Resolve a full id or a unique id prefix
    pub async fn resolve_id(&self, prefix: &str) -> Result<TaskId> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(Error::InvalidInput("Task ID cannot be empty".into()));
        }

        let tasks = store::load_tasks(self.store.as_ref()).await?;
        if let Some(task) = tasks.iter().find(|task| task.id.as_str() == prefix) {
            return Ok(task.id.clone());
        }

        let mut matches = tasks
            .iter()
            .filter(|task| task.id.as_str().starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task.id.clone()),
            (None, _) => Err(Error::TaskNotFound(prefix.to_string())),
            (Some(_), Some(_)) => Err(Error::InvalidInput(format!(
                "Task ID prefix '{prefix}' is ambiguous"
            ))),
        }
    }

    pub async fn add(&self, text: &str, date: &str) -> Result<TaskRecord> {
        let text = normalize_text_option(Some(text.to_string()))
            .ok_or_else(|| Error::InvalidInput("Task text cannot be empty".into()))?;
        let task = TaskRecord::new(text, normalize_date(date)?);

        let _guard = self.store.write_lock().lock().await;
        let mut tasks = store::load_tasks(self.store.as_ref()).await?;
        tasks.push(task.clone());
        store::save_tasks(self.store.as_ref(), &tasks).await?;
        debug!(id = %task.id, "Task added");
        Ok(task)
    }

    pub async fn edit_text(&self, id: &TaskId, text: &str) -> Result<TaskRecord> {
        let text = normalize_text_option(Some(text.to_string()))
            .ok_or_else(|| Error::InvalidInput("Task text cannot be empty".into()))?;
        self.update(id, |task| task.text = text).await
    }

    pub async fn set_date(&self, id: &TaskId, date: &str) -> Result<TaskRecord> {
        let date = normalize_date(date)?;
        self.update(id, |task| task.date = date).await
    }

    /// Mark a task done or open again. The fired flag is left alone; only a
    /// reminder change resets it.
    pub async fn set_completed(&self, id: &TaskId, completed: bool) -> Result<TaskRecord> {
        self.update(id, |task| task.completed = completed).await
    }

    /// Set or clear the reminder time (`HH:MM`)
    pub async fn set_reminder(&self, id: &TaskId, reminder: Option<&str>) -> Result<TaskRecord> {
        let reminder = reminder.map(normalize_reminder_time).transpose()?;
        self.update(id, |task| {
            task.reminder = reminder;
            task.reminded = false;
        })
        .await
    }

    /// Remove a task. No tombstone is kept, so a copy still present on the
    /// remote comes back on the next sync.
    pub async fn delete(&self, id: &TaskId) -> Result<TaskRecord> {
        let _guard = self.store.write_lock().lock().await;
        let mut tasks = store::load_tasks(self.store.as_ref()).await?;
        let index = tasks
            .iter()
            .position(|task| &task.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        let removed = tasks.remove(index);
        store::save_tasks(self.store.as_ref(), &tasks).await?;
        debug!(id = %id, "Task deleted");
        Ok(removed)
    }

    /// Flag every task whose reminder is due at `time` on `date` and return
    /// them. Firing a reminder is not an edit, so timestamps stay put.
    pub async fn mark_due_reminders(&self, date: &str, time: &str) -> Result<Vec<TaskRecord>> {
        let date = normalize_date(date)?;
        let time = normalize_reminder_time(time)?;

        let _guard = self.store.write_lock().lock().await;
        let mut tasks = store::load_tasks(self.store.as_ref()).await?;
        let mut due = Vec::new();
        for task in &mut tasks {
            if task.is_due(&date, &time) {
                task.reminded = true;
                due.push(task.clone());
            }
        }
        if !due.is_empty() {
            store::save_tasks(self.store.as_ref(), &tasks).await?;
        }
        Ok(due)
    }

    async fn update(&self, id: &TaskId, edit: impl FnOnce(&mut TaskRecord)) -> Result<TaskRecord> {
        let _guard = self.store.write_lock().lock().await;
        let mut tasks = store::load_tasks(self.store.as_ref()).await?;
        let task = tasks
            .iter_mut()
            .find(|task| &task.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        edit(task);
        task.timestamp = next_timestamp(Some(task.timestamp));
        let updated = task.clone();

        store::save_tasks(self.store.as_ref(), &tasks).await?;
        debug!(id = %id, "Task updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryStore;

    fn task_list() -> TaskList {
        TaskList::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn add_validates_and_persists() {
        let tasks = task_list();
        assert!(matches!(
            tasks.add("   ", "2024-05-01").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(tasks.add("x", "05/01/2024").await.is_err());

        let task = tasks.add("  buy milk ", "2024-05-01").await.unwrap();
        assert_eq!(task.text, "buy milk");
        assert_eq!(tasks.list().await.unwrap(), vec![task]);
    }

    #[tokio::test]
    async fn edits_bump_timestamp_strictly() {
        let tasks = task_list();
        let task = tasks.add("draft", "2024-05-01").await.unwrap();

        let edited = tasks.edit_text(&task.id, "final").await.unwrap();
        assert_eq!(edited.text, "final");
        assert!(edited.timestamp > task.timestamp);

        let moved = tasks.set_date(&task.id, "2024-05-02").await.unwrap();
        assert!(moved.timestamp > edited.timestamp);
        assert_eq!(tasks.list_for_date("2024-05-02").await.unwrap().len(), 1);
        assert!(tasks.list_for_date("2024-05-01").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_reminder_changes_reset_reminded() {
        let tasks = task_list();
        let task = tasks.add("call", "2024-05-01").await.unwrap();
        tasks.set_reminder(&task.id, Some("09:05")).await.unwrap();
        let due = tasks.mark_due_reminders("2024-05-01", "09:05").await.unwrap();
        assert_eq!(due.len(), 1);

        let done = tasks.set_completed(&task.id, true).await.unwrap();
        assert!(done.completed);
        assert!(done.reminded);

        let reopened = tasks.set_completed(&task.id, false).await.unwrap();
        assert!(reopened.reminded);
        assert!(tasks
            .mark_due_reminders("2024-05-01", "09:05")
            .await
            .unwrap()
            .is_empty());

        let rescheduled = tasks.set_reminder(&task.id, Some("09:30")).await.unwrap();
        assert!(!rescheduled.reminded);
    }

    #[tokio::test]
    async fn reminders_fire_once_without_touching_timestamp() {
        let tasks = task_list();
        let task = tasks.add("standup", "2024-05-01").await.unwrap();
        let with_reminder = tasks.set_reminder(&task.id, Some("10:00")).await.unwrap();
        assert_eq!(with_reminder.reminder.as_deref(), Some("10:00"));

        let due = tasks.mark_due_reminders("2024-05-01", "10:00").await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].timestamp, with_reminder.timestamp);
        assert!(tasks
            .mark_due_reminders("2024-05-01", "10:00")
            .await
            .unwrap()
            .is_empty());

        let cleared = tasks.set_reminder(&task.id, None).await.unwrap();
        assert_eq!(cleared.reminder, None);
        assert!(tasks.set_reminder(&task.id, Some("25:00")).await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let tasks = task_list();
        let task = tasks.add("temp", "2024-05-01").await.unwrap();
        tasks.delete(&task.id).await.unwrap();
        assert!(tasks.list().await.unwrap().is_empty());
        assert!(matches!(
            tasks.delete(&task.id).await,
            Err(Error::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn resolve_id_accepts_unique_prefix() {
        let store = Arc::new(MemoryStore::new());
        let records = ["abc123", "abd456"]
            .into_iter()
            .map(|id| TaskRecord {
                id: id.into(),
                ..TaskRecord::new("x", "2024-05-01")
            })
            .collect::<Vec<_>>();
        store::save_tasks(store.as_ref(), &records).await.unwrap();
        let tasks = TaskList::new(store);

        assert_eq!(tasks.resolve_id("abc").await.unwrap().as_str(), "abc123");
        assert!(matches!(
            tasks.resolve_id("ab").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            tasks.resolve_id("zz").await,
            Err(Error::TaskNotFound(_))
        ));
    }
}
