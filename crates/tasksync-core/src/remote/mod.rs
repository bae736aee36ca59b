//! Remote document store holding one JSON document per account.

mod gist;
mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

pub use gist::{GistClient, DEFAULT_GITHUB_API_URL};
pub use memory::{MemoryRemoteStore, RemoteCallCounts};

/// Listing entry for a stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub description: Option<String>,
    pub filenames: Vec<String>,
}

impl DocumentSummary {
    /// Whether this document is the one identified by `description` + `filename`
    pub fn matches(&self, description: &str, filename: &str) -> bool {
        self.description.as_deref() == Some(description)
            && self.filenames.iter().any(|name| name == filename)
    }
}

/// REST-style document store addressed with a bearer token.
///
/// Transport failures map to [`crate::Error::RemoteUnavailable`]; rejected
/// credentials map to [`crate::Error::Auth`].
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    async fn list_documents(&self, token: &str) -> Result<Vec<DocumentSummary>>;

    /// Create a document with a single file and return its id
    async fn create_document(
        &self,
        token: &str,
        description: &str,
        filename: &str,
        content: &str,
    ) -> Result<String>;

    /// Read all files of a document as `filename -> content`
    async fn read_document(&self, token: &str, id: &str) -> Result<HashMap<String, String>>;

    /// Replace the content of one file of a document
    async fn replace_document_content(
        &self,
        token: &str,
        id: &str,
        filename: &str,
        content: &str,
    ) -> Result<()>;
}
