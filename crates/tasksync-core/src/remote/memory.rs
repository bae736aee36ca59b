//! In-process document store for tests and offline use

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{DocumentSummary, RemoteDocumentStore};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct StoredDocument {
    description: String,
    files: HashMap<String, String>,
}

/// Operation counters of a [`MemoryRemoteStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCallCounts {
    pub lists: usize,
    pub creates: usize,
    pub reads: usize,
    pub writes: usize,
}

/// Remote store kept in memory.
///
/// Besides storing documents it can delay calls, fail them, inject a
/// write from "another device", and records whether two calls ever
/// overlapped in time.
#[derive(Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<Vec<(String, StoredDocument)>>,
    counts: Mutex<RemoteCallCounts>,
    latency: Mutex<Option<Duration>>,
    failure: Mutex<Option<Error>>,
    write_after_read: Mutex<Option<(String, String, String)>>,
    in_call: AtomicBool,
    overlapping_calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document directly, returning its id
    pub fn insert_document(&self, description: &str, filename: &str, content: &str) -> String {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let id = format!("doc-{}", documents.len() + 1);
        documents.push((
            id.clone(),
            StoredDocument {
                description: description.to_string(),
                files: HashMap::from([(filename.to_string(), content.to_string())]),
            },
        ));
        id
    }

    /// Current content of a document file
    pub fn content(&self, id: &str, filename: &str) -> Option<String> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .and_then(|(_, document)| document.files.get(filename).cloned())
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn counts(&self) -> RemoteCallCounts {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of calls that started while another call was still running
    pub fn overlapping_calls(&self) -> usize {
        self.overlapping_calls.load(Ordering::SeqCst)
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Fail every call with `error` until cleared
    pub fn set_failure(&self, error: Option<Error>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// After the next successful read, overwrite `filename` of document `id`
    /// with `content`, as if another device had written in between.
    pub fn write_after_next_read(&self, id: &str, filename: &str, content: &str) {
        *self
            .write_after_read
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            Some((id.to_string(), filename.to_string(), content.to_string()));
    }

    async fn enter(&self) -> Result<CallGuard<'_>> {
        if self.in_call.swap(true, Ordering::SeqCst) {
            self.overlapping_calls.fetch_add(1, Ordering::SeqCst);
        }
        let guard = CallGuard { store: self };

        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(clone_error);
        match failure {
            Some(error) => Err(error),
            None => Ok(guard),
        }
    }

    fn with_document<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut StoredDocument) -> T,
    ) -> Result<T> {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        documents
            .iter_mut()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, document)| f(document))
            .ok_or_else(|| Error::RemoteUnavailable(format!("document {id} not found (404)")))
    }

    fn bump(&self, update: impl FnOnce(&mut RemoteCallCounts)) {
        update(&mut self.counts.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

struct CallGuard<'a> {
    store: &'a MemoryRemoteStore,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.store.in_call.store(false, Ordering::SeqCst);
    }
}

fn clone_error(error: &Error) -> Error {
    match error {
        Error::Auth(message) => Error::Auth(message.clone()),
        Error::MalformedDocument(message) => Error::MalformedDocument(message.clone()),
        other => Error::RemoteUnavailable(other.to_string()),
    }
}

#[async_trait]
impl RemoteDocumentStore for MemoryRemoteStore {
    async fn list_documents(&self, _token: &str) -> Result<Vec<DocumentSummary>> {
        let _guard = self.enter().await?;
        self.bump(|counts| counts.lists += 1);

        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(documents
            .iter()
            .map(|(id, document)| {
                let mut filenames = document.files.keys().cloned().collect::<Vec<_>>();
                filenames.sort();
                DocumentSummary {
                    id: id.clone(),
                    description: Some(document.description.clone()),
                    filenames,
                }
            })
            .collect())
    }

    async fn create_document(
        &self,
        _token: &str,
        description: &str,
        filename: &str,
        content: &str,
    ) -> Result<String> {
        let _guard = self.enter().await?;
        self.bump(|counts| counts.creates += 1);
        Ok(self.insert_document(description, filename, content))
    }

    async fn read_document(&self, _token: &str, id: &str) -> Result<HashMap<String, String>> {
        let _guard = self.enter().await?;
        self.bump(|counts| counts.reads += 1);
        let files = self.with_document(id, |document| document.files.clone())?;

        let pending = self
            .write_after_read
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((target, filename, content)) = pending {
            self.with_document(&target, |document| {
                document.files.insert(filename, content);
            })?;
        }

        Ok(files)
    }

    async fn replace_document_content(
        &self,
        _token: &str,
        id: &str,
        filename: &str,
        content: &str,
    ) -> Result<()> {
        let _guard = self.enter().await?;
        self.bump(|counts| counts.writes += 1);
        self.with_document(id, |document| {
            document
                .files
                .insert(filename.to_string(), content.to_string());
        })
    }
}
