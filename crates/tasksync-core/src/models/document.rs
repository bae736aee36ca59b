//! Remote document wire model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskRecord;
use crate::error::{Error, Result};
use crate::util::compact_text;

/// Version assigned to a freshly created remote document
pub const INITIAL_DOCUMENT_VERSION: u64 = 1;

/// The single JSON document holding the synced collection.
///
/// `version` is the write-generation counter and goes up by exactly one on
/// every successful remote write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    /// Documents written by older clients store the collection under `todos`
    #[serde(alias = "todos")]
    pub records: Vec<TaskRecord>,
    pub version: u64,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl RemoteDocument {
    /// Seed document used when the account has none yet
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            records: Vec::new(),
            version: INITIAL_DOCUMENT_VERSION,
            last_sync: Some(now),
        }
    }

    /// Next generation of this document carrying `records`
    #[must_use]
    pub fn successor(&self, records: Vec<TaskRecord>, now: DateTime<Utc>) -> Self {
        Self {
            records,
            version: self.version.saturating_add(1),
            last_sync: Some(now),
        }
    }

    /// Parse document content, rejecting anything that is not the wire shape
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|error| {
            Error::MalformedDocument(format!(
                "{error} (content: {})",
                compact_text(content)
            ))
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_shape() {
        let raw = r#"{
            "records": [{"id":"1","text":"buy milk","date":"2024-05-01","timestamp":100,"reminder":null,"reminded":false,"completed":false}],
            "version": 3,
            "lastSync": "2024-05-01T10:00:00.000Z"
        }"#;
        let document = RemoteDocument::from_json(raw).unwrap();
        assert_eq!(document.version, 3);
        assert_eq!(document.records.len(), 1);
        assert!(document.last_sync.is_some());
    }

    #[test]
    fn accepts_legacy_todos_key() {
        let raw = r#"{"todos": [], "version": 1, "lastSync": "2024-05-01T10:00:00Z"}"#;
        let document = RemoteDocument::from_json(raw).unwrap();
        assert!(document.records.is_empty());

        let written = document.to_json().unwrap();
        assert!(written.contains("\"records\""));
        assert!(!written.contains("\"todos\""));
    }

    #[test]
    fn rejects_malformed_content() {
        assert!(matches!(
            RemoteDocument::from_json("not json"),
            Err(Error::MalformedDocument(_))
        ));
        assert!(matches!(
            RemoteDocument::from_json(r#"{"records": [], "version": "two"}"#),
            Err(Error::MalformedDocument(_))
        ));
        assert!(matches!(
            RemoteDocument::from_json(r#"{"version": 2}"#),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn successor_bumps_version_by_one() {
        let now = Utc::now();
        let document = RemoteDocument::empty(now);
        assert_eq!(document.version, INITIAL_DOCUMENT_VERSION);
        let next = document.successor(Vec::new(), now);
        assert_eq!(next.version, INITIAL_DOCUMENT_VERSION + 1);
    }
}
