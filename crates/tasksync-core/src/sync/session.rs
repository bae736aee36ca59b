//! One sync session: fetch, merge, persist, publish.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::conflict::{ConflictDetector, FieldConflictDetector};
use super::merge::merge;
use super::status::{SyncEvent, SyncReport, SyncStatus};
use crate::auth::CredentialProvider;
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::{RemoteDocument, SyncConflict, SyncMetadata, TaskRecord};
use crate::remote::RemoteDocumentStore;
use crate::store::{self, LocalStore};

const EVENT_CAPACITY: usize = 64;

/// Reconciles the local collection with the remote document.
///
/// The engine itself does not serialize sessions; hosts drive it through a
/// [`super::SyncScheduler`], which guarantees one session at a time.
pub struct SyncEngine {
    credentials: Arc<dyn CredentialProvider>,
    remote: Arc<dyn RemoteDocumentStore>,
    local: Arc<dyn LocalStore>,
    detector: Option<Arc<dyn ConflictDetector>>,
    settings: SyncSettings,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        remote: Arc<dyn RemoteDocumentStore>,
        local: Arc<dyn LocalStore>,
        settings: SyncSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            credentials,
            remote,
            local,
            detector: Some(Arc::new(FieldConflictDetector)),
            settings,
            events,
        }
    }

    #[must_use]
    pub fn with_conflict_detector(mut self, detector: Arc<dyn ConflictDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    #[must_use]
    pub fn without_conflict_detector(mut self) -> Self {
        self.detector = None;
        self
    }

    /// Receive [`SyncEvent`]s from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn local_store(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one full session and broadcast its outcome.
    pub async fn sync(&self) -> Result<SyncReport> {
        debug!("Starting sync session");
        let result = self.run_session().await;

        let status = match &result {
            Ok(report) => {
                info!(
                    records = report.records.len(),
                    conflicts = report.conflicts.len(),
                    version = report.written_version,
                    "Sync completed"
                );
                SyncStatus::succeeded(report.synced_at)
            }
            Err(err) => {
                error!("Sync failed: {err}");
                SyncStatus::failed(err, Utc::now())
            }
        };
        self.broadcast(SyncEvent::Status(status));
        result
    }

    async fn run_session(&self) -> Result<SyncReport> {
        let token = self.credentials.token().await?;
        let (document_id, created_document) = self.locate_or_create(&token).await?;

        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            let remote = self.fetch_document(&token, &document_id).await?;
            let snapshot = store::load_snapshot(self.local.as_ref()).await?;

            let conflicts = if snapshot.metadata.is_behind(remote.version) {
                debug!(
                    local_version = ?snapshot.metadata.last_sync_version,
                    remote_version = remote.version,
                    "Remote changed since last sync"
                );
                self.detect_conflicts(&snapshot.tasks, &remote.records)
            } else {
                Vec::new()
            };
            let records = merge(&snapshot.tasks, &remote.records);

            if self.settings.verify_remote_version {
                let current = self.fetch_document(&token, &document_id).await?.version;
                if current != remote.version {
                    if attempts <= self.settings.max_version_retries {
                        warn!(
                            expected = remote.version,
                            found = current,
                            "Remote document moved during sync, retrying"
                        );
                        continue;
                    }
                    return Err(Error::VersionConflict {
                        expected: remote.version,
                        found: current,
                    });
                }
            }

            let synced_at = Utc::now();
            let records = self
                .persist_merged(
                    &records,
                    SyncMetadata {
                        last_sync_version: Some(remote.version),
                        last_sync_time: Some(synced_at),
                    },
                )
                .await?;
            self.broadcast(SyncEvent::RecordsUpdated(records.clone()));

            let written = remote.successor(records, synced_at);
            self.remote
                .replace_document_content(
                    &token,
                    &document_id,
                    &self.settings.document_filename,
                    &written.to_json()?,
                )
                .await?;

            return Ok(SyncReport {
                records: written.records,
                conflicts,
                remote_version: remote.version,
                written_version: written.version,
                created_document,
                attempts,
                synced_at,
            });
        }
    }

    /// Write the merge result locally. The collection is re-read under the
    /// store's write lock and merged again, so edits made while the session
    /// waited on the remote survive. Returns what was written.
    async fn persist_merged(
        &self,
        merged: &[TaskRecord],
        metadata: SyncMetadata,
    ) -> Result<Vec<TaskRecord>> {
        let _guard = self.local.write_lock().lock().await;
        let current = store::load_tasks(self.local.as_ref()).await?;
        let records = merge(&current, merged);
        store::save_sync_result(self.local.as_ref(), &records, metadata).await?;
        Ok(records)
    }

    /// Find the backup document, creating it when the account has none.
    async fn locate_or_create(&self, token: &str) -> Result<(String, bool)> {
        let description = &self.settings.document_description;
        let filename = &self.settings.document_filename;

        let documents = self.remote.list_documents(token).await?;
        if let Some(document) = documents
            .iter()
            .find(|document| document.matches(description, filename))
        {
            debug!(id = %document.id, "Found remote document");
            return Ok((document.id.clone(), false));
        }

        let seed = RemoteDocument::empty(Utc::now());
        let id = self
            .remote
            .create_document(token, description, filename, &seed.to_json()?)
            .await?;
        info!(id = %id, "Created remote document");
        Ok((id, true))
    }

    async fn fetch_document(&self, token: &str, id: &str) -> Result<RemoteDocument> {
        let files = self.remote.read_document(token, id).await?;
        let content = files.get(&self.settings.document_filename).ok_or_else(|| {
            Error::MalformedDocument(format!(
                "document {id} has no {} file",
                self.settings.document_filename
            ))
        })?;
        RemoteDocument::from_json(content)
    }

    fn detect_conflicts(&self, local: &[TaskRecord], remote: &[TaskRecord]) -> Vec<SyncConflict> {
        let Some(detector) = &self.detector else {
            return Vec::new();
        };
        let conflicts = detector.find_conflicts(local, remote);
        for conflict in &conflicts {
            info!(
                id = %conflict.id,
                winner = ?conflict.winner(),
                "Task edited on both sides"
            );
        }
        conflicts
    }

    fn broadcast(&self, event: SyncEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::config::{DEFAULT_DOCUMENT_DESCRIPTION, DEFAULT_DOCUMENT_FILENAME};
    use crate::models::TaskId;
    use crate::remote::{MemoryRemoteStore, RemoteCallCounts};
    use crate::store::MemoryStore;

    fn record(id: &str, text: &str, timestamp: i64) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            text: text.to_string(),
            date: "2024-05-01".to_string(),
            timestamp,
            reminder: None,
            reminded: false,
            completed: false,
        }
    }

    fn engine(remote: &Arc<MemoryRemoteStore>, local: &Arc<MemoryStore>) -> SyncEngine {
        SyncEngine::new(
            Arc::new(StaticTokenProvider::new("token").unwrap()),
            Arc::clone(remote) as Arc<dyn RemoteDocumentStore>,
            Arc::clone(local) as Arc<dyn LocalStore>,
            SyncSettings::default(),
        )
    }

    fn seed_remote(remote: &MemoryRemoteStore, records: Vec<TaskRecord>, version: u64) -> String {
        let document = RemoteDocument {
            records,
            version,
            last_sync: None,
        };
        remote.insert_document(
            DEFAULT_DOCUMENT_DESCRIPTION,
            DEFAULT_DOCUMENT_FILENAME,
            &document.to_json().unwrap(),
        )
    }

    fn remote_document(remote: &MemoryRemoteStore, id: &str) -> RemoteDocument {
        RemoteDocument::from_json(&remote.content(id, DEFAULT_DOCUMENT_FILENAME).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn newer_remote_edit_replaces_local_copy() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let id = seed_remote(&remote, vec![record("1", "buy milk and bread", 200)], 4);
        store::save_tasks(local.as_ref(), &[record("1", "buy milk", 100)])
            .await
            .unwrap();

        let report = engine(&remote, &local).sync().await.unwrap();

        let expected = vec![record("1", "buy milk and bread", 200)];
        assert_eq!(report.records, expected);
        assert_eq!(store::load_tasks(local.as_ref()).await.unwrap(), expected);
        let written = remote_document(&remote, &id);
        assert_eq!(written.records, expected);
        assert_eq!(written.version, 5);
    }

    #[tokio::test]
    async fn local_only_record_is_kept_and_pushed() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let id = seed_remote(&remote, vec![record("3", "remote", 70)], 1);
        store::save_tasks(local.as_ref(), &[record("2", "local", 50)])
            .await
            .unwrap();

        let report = engine(&remote, &local).sync().await.unwrap();

        let ids = report
            .records
            .iter()
            .map(|record| record.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(remote_document(&remote, &id).records, report.records);
    }

    #[tokio::test]
    async fn missing_document_is_created_then_written_as_version_two() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        store::save_tasks(local.as_ref(), &[record("1", "first", 10)])
            .await
            .unwrap();

        let report = engine(&remote, &local).sync().await.unwrap();

        assert!(report.created_document);
        assert_eq!(report.remote_version, 1);
        assert_eq!(report.written_version, 2);
        assert_eq!(remote.counts().creates, 1);

        let ids = remote.document_ids();
        assert_eq!(ids.len(), 1);
        let written = remote_document(&remote, &ids[0]);
        assert_eq!(written.version, 2);
        assert_eq!(written.records, vec![record("1", "first", 10)]);

        let snapshot = store::load_snapshot(local.as_ref()).await.unwrap();
        assert_eq!(snapshot.metadata.last_sync_version, Some(1));
        assert!(snapshot.metadata.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn second_sync_reuses_the_document() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let engine = engine(&remote, &local);

        engine.sync().await.unwrap();
        let report = engine.sync().await.unwrap();

        assert!(!report.created_document);
        assert_eq!(report.written_version, 3);
        assert_eq!(remote.document_ids().len(), 1);
    }

    #[tokio::test]
    async fn document_with_other_description_is_ignored() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        remote.insert_document("Something else", DEFAULT_DOCUMENT_FILENAME, "{}");

        let report = engine(&remote, &local).sync().await.unwrap();
        assert!(report.created_document);
        assert_eq!(remote.document_ids().len(), 2);
    }

    #[tokio::test]
    async fn conflicts_are_reported_when_remote_moved() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        seed_remote(&remote, vec![record("1", "remote edit", 300)], 3);
        store::save_sync_result(
            local.as_ref(),
            &[record("1", "local edit", 200)],
            SyncMetadata {
                last_sync_version: Some(1),
                last_sync_time: None,
            },
        )
        .await
        .unwrap();

        let report = engine(&remote, &local).sync().await.unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].id, TaskId::from("1"));
        assert_eq!(report.records[0].text, "remote edit");
    }

    #[tokio::test]
    async fn disabled_detector_reports_nothing_but_merges_the_same() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        seed_remote(&remote, vec![record("1", "remote edit", 300)], 3);
        store::save_sync_result(
            local.as_ref(),
            &[record("1", "local edit", 200)],
            SyncMetadata {
                last_sync_version: Some(1),
                last_sync_time: None,
            },
        )
        .await
        .unwrap();

        let report = engine(&remote, &local)
            .without_conflict_detector()
            .sync()
            .await
            .unwrap();
        assert!(report.conflicts.is_empty());
        assert_eq!(report.records[0].text, "remote edit");
    }

    #[tokio::test]
    async fn custom_detector_replaces_the_default() {
        struct CompletionOnly;

        impl ConflictDetector for CompletionOnly {
            fn find_conflicts(
                &self,
                local: &[TaskRecord],
                remote: &[TaskRecord],
            ) -> Vec<SyncConflict> {
                local
                    .iter()
                    .filter_map(|mine| {
                        remote
                            .iter()
                            .find(|theirs| {
                                theirs.id == mine.id && theirs.completed != mine.completed
                            })
                            .map(|theirs| SyncConflict {
                                id: mine.id.clone(),
                                local: mine.clone(),
                                remote: theirs.clone(),
                            })
                    })
                    .collect()
            }
        }

        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let mut finished = record("2", "same text", 300);
        finished.completed = true;
        seed_remote(
            &remote,
            vec![record("1", "remote edit", 300), finished],
            3,
        );
        store::save_sync_result(
            local.as_ref(),
            &[record("1", "local edit", 200), record("2", "same text", 200)],
            SyncMetadata {
                last_sync_version: Some(1),
                last_sync_time: None,
            },
        )
        .await
        .unwrap();

        let report = engine(&remote, &local)
            .with_conflict_detector(Arc::new(CompletionOnly))
            .sync()
            .await
            .unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].id, TaskId::from("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn edit_made_before_persist_is_merged_not_overwritten() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let id = seed_remote(&remote, vec![record("1", "from laptop", 100)], 2);
        remote.set_latency(Some(Duration::from_millis(50)));

        let engine = Arc::new(engine(&remote, &local));
        let running = Arc::clone(&engine);
        let session = tokio::spawn(async move { running.sync().await });

        // Lands while the session waits on the remote
        tokio::time::sleep(Duration::from_millis(120)).await;
        store::save_tasks(local.as_ref(), &[record("2", "from phone", 500)])
            .await
            .unwrap();

        let report = session.await.unwrap().unwrap();
        let ids = report
            .records
            .iter()
            .map(|task| task.id.as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["2".to_string(), "1".to_string()]);
        assert_eq!(store::load_tasks(local.as_ref()).await.unwrap().len(), 2);
        assert_eq!(remote_document(&remote, &id).records, report.records);
    }

    #[tokio::test]
    async fn first_sync_skips_conflict_detection() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        seed_remote(&remote, vec![record("1", "remote edit", 300)], 3);
        store::save_tasks(local.as_ref(), &[record("1", "local edit", 200)])
            .await
            .unwrap();

        let report = engine(&remote, &local).sync().await.unwrap();
        assert!(report.conflicts.is_empty());
    }

    #[tokio::test]
    async fn malformed_remote_leaves_local_state_untouched() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        remote.insert_document(
            DEFAULT_DOCUMENT_DESCRIPTION,
            DEFAULT_DOCUMENT_FILENAME,
            "not json",
        );
        store::save_tasks(local.as_ref(), &[record("1", "keep me", 10)])
            .await
            .unwrap();
        let writes_before = local.write_count();

        let error = engine(&remote, &local).sync().await.unwrap_err();

        assert!(matches!(error, Error::MalformedDocument(_)));
        assert_eq!(local.write_count(), writes_before);
        assert_eq!(remote.counts().writes, 0);
    }

    #[tokio::test]
    async fn auth_failure_stops_before_any_remote_call() {
        struct NoToken;

        #[async_trait::async_trait]
        impl CredentialProvider for NoToken {
            async fn token(&self) -> Result<String> {
                Err(Error::Auth("user closed the sign-in window".into()))
            }
        }

        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(
            Arc::new(NoToken),
            Arc::clone(&remote) as Arc<dyn RemoteDocumentStore>,
            Arc::clone(&local) as Arc<dyn LocalStore>,
            SyncSettings::default(),
        );

        assert!(matches!(engine.sync().await, Err(Error::Auth(_))));
        assert_eq!(remote.counts(), RemoteCallCounts::default());
        assert_eq!(local.write_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_remote_is_reported() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        remote.set_failure(Some(Error::RemoteUnavailable("connection reset".into())));

        let error = engine(&remote, &local).sync().await.unwrap_err();
        assert!(matches!(error, Error::RemoteUnavailable(_)));
        assert_eq!(local.write_count(), 0);
    }

    #[tokio::test]
    async fn local_write_failure_skips_remote_write() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        seed_remote(&remote, vec![record("1", "remote", 1)], 1);
        local.set_fail_writes(true);

        let error = engine(&remote, &local).sync().await.unwrap_err();
        assert!(matches!(error, Error::LocalStore(_)));
        assert_eq!(remote.counts().writes, 0);
    }

    #[tokio::test]
    async fn moved_remote_restarts_the_merge() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let id = seed_remote(&remote, vec![record("1", "old", 1)], 1);
        let concurrent = RemoteDocument {
            records: vec![record("1", "old", 1), record("9", "other device", 50)],
            version: 5,
            last_sync: None,
        };
        remote.write_after_next_read(&id, DEFAULT_DOCUMENT_FILENAME, &concurrent.to_json().unwrap());

        let report = engine(&remote, &local).sync().await.unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.remote_version, 5);
        assert_eq!(report.written_version, 6);
        assert!(report
            .records
            .iter()
            .any(|record| record.id == TaskId::from("9")));
    }

    #[tokio::test]
    async fn moved_remote_without_retries_is_a_version_conflict() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let id = seed_remote(&remote, Vec::new(), 1);
        let concurrent = RemoteDocument {
            records: Vec::new(),
            version: 2,
            last_sync: None,
        };
        remote.write_after_next_read(&id, DEFAULT_DOCUMENT_FILENAME, &concurrent.to_json().unwrap());

        let settings = SyncSettings {
            max_version_retries: 0,
            ..SyncSettings::default()
        };
        let engine = SyncEngine::new(
            Arc::new(StaticTokenProvider::new("token").unwrap()),
            Arc::clone(&remote) as Arc<dyn RemoteDocumentStore>,
            Arc::clone(&local) as Arc<dyn LocalStore>,
            settings,
        );

        let error = engine.sync().await.unwrap_err();
        assert!(matches!(
            error,
            Error::VersionConflict {
                expected: 1,
                found: 2
            }
        ));
        assert_eq!(local.write_count(), 0);
        assert_eq!(remote.counts().writes, 0);
    }

    #[tokio::test]
    async fn events_report_records_then_status() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        let engine = engine(&remote, &local);
        let mut events = engine.subscribe();

        let report = engine.sync().await.unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::RecordsUpdated(report.records.clone())
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::Status(SyncStatus::succeeded(report.synced_at))
        );
    }

    #[tokio::test]
    async fn failure_is_broadcast_as_status() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryStore::new());
        remote.set_failure(Some(Error::RemoteUnavailable("offline".into())));
        let engine = engine(&remote, &local);
        let mut events = engine.subscribe();

        engine.sync().await.unwrap_err();

        match events.try_recv().unwrap() {
            SyncEvent::Status(status) => {
                assert!(!status.success);
                assert!(status.error.unwrap().contains("offline"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
