//! Credential providers supplying the bearer token for the remote store.
//!
//! Obtaining a token interactively (OAuth browser flow) is the host's job;
//! providers here only hand out a token that already exists.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

/// Source of the bearer token used for every remote call of a sync session.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a usable token or [`Error::Auth`]
    async fn token(&self) -> Result<String>;
}

/// Checks that a token is accepted by the remote before it is used.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<()>;
}

/// Durable storage for a previously obtained token (keychain, file, ...)
pub trait TokenPersistence: Send + Sync {
    fn load_token(&self) -> Result<Option<String>>;
    fn save_token(&self, token: &str) -> Result<()>;
    fn clear_token(&self) -> Result<()>;
}

/// Provider returning a fixed token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = normalize_text_option(Some(token.into()))
            .ok_or_else(|| Error::Auth("access token must not be empty".to_string()))?;
        Ok(Self { token })
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticTokenProvider")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Provider reading the token from persistence and, when a validator is
/// configured, checking it with the remote once per distinct token.
pub struct StoredTokenProvider<P: TokenPersistence> {
    persistence: P,
    validator: Option<Arc<dyn TokenValidator>>,
    validated: Mutex<Option<String>>,
}

impl<P: TokenPersistence> StoredTokenProvider<P> {
    pub fn new(persistence: P) -> Self {
        Self {
            persistence,
            validator: None,
            validated: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub const fn persistence(&self) -> &P {
        &self.persistence
    }

    fn is_validated(&self, token: &str) -> bool {
        self.validated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(token)
    }
}

#[async_trait]
impl<P: TokenPersistence> CredentialProvider for StoredTokenProvider<P> {
    async fn token(&self) -> Result<String> {
        let token = self
            .persistence
            .load_token()
            .map_err(|error| Error::Auth(format!("failed to load stored token: {error}")))?
            .and_then(|token| normalize_text_option(Some(token)))
            .ok_or_else(|| Error::Auth("no access token is stored".to_string()))?;

        let Some(validator) = &self.validator else {
            return Ok(token);
        };
        if self.is_validated(&token) {
            return Ok(token);
        }

        validator.validate(&token).await.map_err(|error| match error {
            Error::Auth(message) => Error::Auth(format!("stored access token was rejected: {message}")),
            other => other,
        })?;
        *self.validated.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct MemoryTokens(Mutex<Option<String>>);

    impl TokenPersistence for MemoryTokens {
        fn load_token(&self) -> Result<Option<String>> {
            Ok(self.0.lock().unwrap().clone())
        }

        fn save_token(&self, token: &str) -> Result<()> {
            *self.0.lock().unwrap() = Some(token.to_string());
            Ok(())
        }

        fn clear_token(&self) -> Result<()> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingValidator {
        calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl TokenValidator for CountingValidator {
        async fn validate(&self, _token: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                Err(Error::Auth("Bad credentials (401)".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn static_provider_rejects_empty_and_redacts() {
        assert!(StaticTokenProvider::new("  ").is_err());
        let provider = StaticTokenProvider::new("secret").unwrap();
        let debug = format!("{provider:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn stored_provider_requires_a_token() {
        let provider = StoredTokenProvider::new(MemoryTokens::default());
        assert!(matches!(provider.token().await, Err(Error::Auth(_))));

        provider.persistence().save_token(" abc ").unwrap();
        assert_eq!(provider.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn stored_provider_validates_each_token_once() {
        let validator = Arc::new(CountingValidator::default());
        let provider = StoredTokenProvider::new(MemoryTokens::default())
            .with_validator(Arc::clone(&validator) as Arc<dyn TokenValidator>);

        provider.persistence().save_token("one").unwrap();
        provider.token().await.unwrap();
        provider.token().await.unwrap();
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);

        provider.persistence().save_token("two").unwrap();
        provider.token().await.unwrap();
        assert_eq!(validator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_token_is_an_auth_error() {
        let validator = Arc::new(CountingValidator {
            calls: AtomicUsize::new(0),
            reject: true,
        });
        let provider = StoredTokenProvider::new(MemoryTokens::default()).with_validator(validator);
        provider.persistence().save_token("stale").unwrap();

        let error = provider.token().await.unwrap_err();
        assert!(error.to_string().contains("rejected"));
    }
}
