use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tasksync_core::auth::{
    CredentialProvider, StaticTokenProvider, StoredTokenProvider, TokenPersistence, TokenValidator,
};
use tasksync_core::config::SyncSettings;
use tasksync_core::remote::GistClient;
use tasksync_core::store::{LocalStore, SqliteStore};
use tasksync_core::util::normalize_text_option;
use tasksync_core::{SyncEngine, TaskId, TaskList, TaskRecord};

use crate::auth::KeyringTokenStore;
use crate::config_profiles::{default_config_path, CliProfilesConfig};
use crate::error::CliError;

pub const TOKEN_ENV: &str = "TASKSYNC_GITHUB_TOKEN";
const DB_PATH_ENV: &str = "TASKSYNC_DB_PATH";
const SHORT_ID_LEN: usize = 13;

/// Paths and profile selection shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub profile: Option<String>,
}

impl CliContext {
    pub fn new(
        db_path: Option<PathBuf>,
        config_path: Option<PathBuf>,
        profile: Option<String>,
    ) -> Self {
        Self {
            db_path: resolve_db_path(db_path),
            config_path: config_path.unwrap_or_else(default_config_path),
            profile,
        }
    }

    pub fn load_config(&self) -> Result<CliProfilesConfig, CliError> {
        CliProfilesConfig::load_from_path(&self.config_path).map_err(CliError::Config)
    }

    pub fn profile_name(&self, config: &CliProfilesConfig) -> String {
        config.resolve_profile_name(self.profile.as_deref())
    }

    /// Effective settings of the selected profile, env overrides applied
    pub fn settings(&self) -> Result<(String, SyncSettings), CliError> {
        let config = self.load_config()?;
        let profile_name = self.profile_name(&config);
        let mut settings = config
            .profile(&profile_name)
            .map(|profile| profile.settings.clone())
            .unwrap_or_default();
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok((profile_name, settings))
    }
}

/// Where the access token of a profile comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    Keychain,
}

impl TokenSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Environment => TOKEN_ENV,
            Self::Keychain => "keychain",
        }
    }
}

pub fn env_token() -> Option<String> {
    normalize_text_option(env::var(TOKEN_ENV).ok())
}

pub fn token_source(
    profile_name: &str,
    env_token: Option<&str>,
) -> Result<Option<TokenSource>, CliError> {
    if env_token.is_some() {
        return Ok(Some(TokenSource::Environment));
    }
    let stored = KeyringTokenStore::new(profile_name).load_token()?;
    Ok(stored.map(|_| TokenSource::Keychain))
}

pub fn open_store(path: &Path) -> Result<Arc<SqliteStore>, CliError> {
    Ok(Arc::new(SqliteStore::open(path)?))
}

pub fn open_task_list(context: &CliContext) -> Result<TaskList, CliError> {
    let store = open_store(&context.db_path)?;
    Ok(TaskList::new(store))
}

/// Build a sync engine for the selected profile on top of `store`
pub fn build_engine(
    context: &CliContext,
    store: Arc<dyn LocalStore>,
) -> Result<SyncEngine, CliError> {
    let (profile_name, settings) = context.settings()?;
    let client = Arc::new(GistClient::new(
        settings.api_base_url.clone(),
        settings.request_timeout(),
    )?);
    let credentials = credential_provider(
        &profile_name,
        &settings,
        &client,
        env_token(),
    )?;
    Ok(SyncEngine::new(credentials, client, store, settings))
}

pub fn credential_provider(
    profile_name: &str,
    settings: &SyncSettings,
    client: &Arc<GistClient>,
    env_token: Option<String>,
) -> Result<Arc<dyn CredentialProvider>, CliError> {
    if let Some(token) = env_token {
        tracing::debug!("Using access token from {TOKEN_ENV}");
        return Ok(Arc::new(StaticTokenProvider::new(token)?));
    }

    let store = KeyringTokenStore::new(profile_name);
    if store.load_token()?.is_none() {
        return Err(CliError::SyncNotConfigured);
    }
    let mut provider = StoredTokenProvider::new(store);
    if settings.validate_token {
        provider = provider.with_validator(Arc::clone(client) as Arc<dyn TokenValidator>);
    }
    Ok(Arc::new(provider))
}

pub async fn resolve_task_id(tasks: &TaskList, query: &str) -> Result<TaskId, CliError> {
    Ok(tasks.resolve_id(query).await?)
}

pub fn resolve_task_text(text_parts: &[String]) -> Result<String, CliError> {
    if let Some(text) = normalize_text(&text_parts.join(" ")) {
        return Ok(text);
    }

    if let Some(text) = read_piped_stdin()? {
        return Ok(text);
    }

    Err(CliError::EmptyText)
}

pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_text(&buffer))
}

pub fn short_id(id: &TaskId) -> String {
    id.as_str().chars().take(SHORT_ID_LEN).collect()
}

pub fn format_task_lines(tasks: &[TaskRecord], show_date: bool) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let marker = if task.completed { "[x]" } else { "[ ]" };
            let preview = task.preview(40);
            let relative_time = format_relative_time(task.timestamp, now_ms);
            let mut line = format!(
                "{:<13}  {marker}  {preview:<40}  {relative_time:<10}",
                short_id(&task.id)
            );
            if show_date {
                line.push_str("  ");
                line.push_str(&task.date);
            }
            if let Some(reminder) = &task.reminder {
                let fired = if task.reminded { " (fired)" } else { "" };
                line.push_str(&format!("  @{reminder}{fired}"));
            }
            line.trim_end().to_string()
        })
        .collect()
}

pub fn format_sync_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasksync")
        .join("tasks.db")
}
