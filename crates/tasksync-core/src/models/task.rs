//! Task record model

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::unix_millis_now;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Stable identifier of a task.
///
/// New ids are UUID v7 strings, but any non-empty string read from a
/// remote document is accepted so older clients' ids keep working.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new unique task ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Task ID cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A task in the user's collection, the unit of synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Unique identifier, immutable
    pub id: TaskId,
    /// User-entered content
    pub text: String,
    /// Calendar day the task belongs to (`YYYY-MM-DD`)
    pub date: String,
    /// Last mutation time (Unix ms), the sole conflict tie-breaker
    pub timestamp: i64,
    /// Optional reminder time of day (`HH:MM`)
    #[serde(default)]
    pub reminder: Option<String>,
    /// Whether the current reminder has already fired
    #[serde(default)]
    pub reminded: bool,
    #[serde(default)]
    pub completed: bool,
}

impl TaskRecord {
    /// Create a new open task for `date`
    pub fn new(text: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            text: text.into(),
            date: date.into(),
            timestamp: unix_millis_now(),
            reminder: None,
            reminded: false,
            completed: false,
        }
    }

    /// Whether the reminder should fire at `time` on `date`.
    pub fn is_due(&self, date: &str, time: &str) -> bool {
        !self.reminded
            && !self.completed
            && self.date == date
            && self.reminder.as_deref() == Some(time)
    }

    /// Get the text truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        let first_line = self.text.lines().next().unwrap_or("");
        if first_line.chars().count() <= max_len {
            return first_line.to_string();
        }
        let mut preview = first_line
            .chars()
            .take(max_len.saturating_sub(3))
            .collect::<String>();
        preview.push_str("...");
        preview
    }
}

/// Validate and normalize a calendar date (`YYYY-MM-DD`).
pub fn normalize_date(value: &str) -> Result<String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map(|date| date.format(DATE_FORMAT).to_string())
        .map_err(|_| Error::InvalidInput(format!("Invalid date '{value}', expected YYYY-MM-DD")))
}

/// Validate and normalize a reminder time of day (`HH:MM`).
pub fn normalize_reminder_time(value: &str) -> Result<String> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map(|time| time.format(TIME_FORMAT).to_string())
        .map_err(|_| Error::InvalidInput(format!("Invalid reminder time '{value}', expected HH:MM")))
}

/// Today's date in local time, formatted as `YYYY-MM-DD`
pub fn today() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

/// Current local time of day, formatted as `HH:MM`
pub fn current_time_of_day() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}
