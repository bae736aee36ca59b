//! Sync configuration shared by every host.
//!
//! Values are safe to persist in a plain config file; the access token is
//! never part of this struct.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::DEFAULT_GITHUB_API_URL;
use crate::util::{is_http_url, normalize_text_option};

/// Description identifying the backup document in the remote store
pub const DEFAULT_DOCUMENT_DESCRIPTION: &str = "Chrome Todo List Backup";
/// Filename of the backup document
pub const DEFAULT_DOCUMENT_FILENAME: &str = "todos.json";

const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_PERIODIC_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_VERSION_RETRIES: u32 = 2;

const ENV_API_BASE_URL: &str = "TASKSYNC_API_BASE_URL";
const ENV_DEBOUNCE_MS: &str = "TASKSYNC_DEBOUNCE_MS";
const ENV_SYNC_INTERVAL_SECS: &str = "TASKSYNC_SYNC_INTERVAL_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Base URL of the remote document store API
    pub api_base_url: String,
    pub document_description: String,
    pub document_filename: String,
    /// Quiet period after a local edit before syncing
    pub debounce_ms: u64,
    /// Period of the background sync trigger
    pub periodic_interval_secs: u64,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Re-check the remote version right before writing
    pub verify_remote_version: bool,
    /// How many times a session restarts when the remote moved underneath it
    pub max_version_retries: u32,
    /// Check a stored token against the remote before first use
    pub validate_token: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_GITHUB_API_URL.to_string(),
            document_description: DEFAULT_DOCUMENT_DESCRIPTION.to_string(),
            document_filename: DEFAULT_DOCUMENT_FILENAME.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            periodic_interval_secs: DEFAULT_PERIODIC_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            verify_remote_version: true,
            max_version_retries: DEFAULT_MAX_VERSION_RETRIES,
            validate_token: true,
        }
    }
}

impl SyncSettings {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub const fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply `TASKSYNC_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(self.api_base_url.trim()) {
            return Err(Error::Config(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }
        if self.document_description.trim().is_empty() {
            return Err(Error::Config(
                "document_description must not be empty".to_string(),
            ));
        }
        if self.document_filename.trim().is_empty() {
            return Err(Error::Config(
                "document_filename must not be empty".to_string(),
            ));
        }
        if self.debounce_ms == 0 {
            return Err(Error::Config("debounce_ms must be positive".to_string()));
        }
        if self.periodic_interval_secs == 0 {
            return Err(Error::Config(
                "periodic_interval_secs must be positive".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = normalize_text_option(lookup(ENV_API_BASE_URL)) {
            self.api_base_url = url;
        }
        if let Some(raw) = normalize_text_option(lookup(ENV_DEBOUNCE_MS)) {
            self.debounce_ms = parse_number(ENV_DEBOUNCE_MS, &raw)?;
        }
        if let Some(raw) = normalize_text_option(lookup(ENV_SYNC_INTERVAL_SECS)) {
            self.periodic_interval_secs = parse_number(ENV_SYNC_INTERVAL_SECS, &raw)?;
        }
        Ok(())
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}
