//! Snapshot data types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// State of one file: last modification time and content hash
///
/// Travels on the wire as `[mtime, hash]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i64, String)", into = "(i64, String)")]
pub struct SnapshotEntry {
    /// Seconds since the Unix epoch
    pub modified: i64,
    /// MD5 hex digest of the file content
    pub content_hash: String,
}

impl SnapshotEntry {
    pub fn new(modified: i64, content_hash: impl Into<String>) -> Self {
        Self {
            modified,
            content_hash: content_hash.into(),
        }
    }
}

impl From<(i64, String)> for SnapshotEntry {
    fn from((modified, content_hash): (i64, String)) -> Self {
        Self {
            modified,
            content_hash,
        }
    }
}

impl From<SnapshotEntry> for (i64, String) {
    fn from(entry: SnapshotEntry) -> Self {
        (entry.modified, entry.content_hash)
    }
}

/// Relative path → entry, one per regular file
pub type Snapshot = BTreeMap<String, SnapshotEntry>;

/// Per-user synchronization state owned by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Advances on every snapshot change, never decreases
    pub last_reconciliation_timestamp: i64,
    pub snapshot: Snapshot,
}

impl SyncState {
    /// Empty state created along with a new account
    pub fn empty(created_at: i64) -> Self {
        Self {
            last_reconciliation_timestamp: created_at,
            snapshot: Snapshot::new(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&SnapshotEntry> {
        self.snapshot.get(path)
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    fn advance_to(&mut self, timestamp: i64) {
        self.last_reconciliation_timestamp = self.last_reconciliation_timestamp.max(timestamp);
    }

    /// Insert or overwrite an entry
    pub fn record(&mut self, path: String, entry: SnapshotEntry) {
        self.advance_to(entry.modified);
        self.snapshot.insert(path, entry);
    }

    /// Remove an entry, returning it if present
    pub fn remove(&mut self, path: &str, now: i64) -> Option<SnapshotEntry> {
        let removed = self.snapshot.remove(path);
        self.advance_to(now);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let mut state = SyncState::empty(10);
        state.record(
            "foo-path".to_string(),
            SnapshotEntry::new(42, "acbd18db4cc2f85cedef654fccc4a4d8"),
        );

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "last_reconciliation_timestamp": 42,
                "snapshot": {"foo-path": [42, "acbd18db4cc2f85cedef654fccc4a4d8"]}
            })
        );

        let back: SyncState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_timestamp_never_decreases() {
        let mut state = SyncState::empty(100);
        state.record("a".to_string(), SnapshotEntry::new(50, "h"));
        assert_eq!(state.last_reconciliation_timestamp, 100);

        state.remove("a", 90);
        assert_eq!(state.last_reconciliation_timestamp, 100);
        assert!(state.is_empty());
    }
}
