//! Build a sync state from what is actually on disk

use std::path::Path;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use super::types::{SnapshotEntry, SyncState};
use crate::hash::hash_file_blocking;

/// Walk `root` and record every regular file
///
/// Blocking; run it on a blocking thread from async code. Unreadable files
/// are skipped with a warning rather than failing the whole scan.
pub fn scan_tree(root: &Path, created_at: i64) -> SyncState {
    let mut state = SyncState::empty(created_at);

    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let hash = match hash_file_blocking(entry.path()) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Failed to hash file");
                continue;
            }
        };
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(created_at);

        state.record(key, SnapshotEntry::new(modified, hash));
    }

    tracing::debug!(root = %root.display(), files = state.len(), "Scanned tree");
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_lists_files_only() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Photos/empty")).unwrap();
        std::fs::write(dir.path().join("WELCOME"), b"foo").unwrap();
        std::fs::write(dir.path().join("Photos/a.txt"), b"foo").unwrap();

        let state = scan_tree(dir.path(), 0);

        assert_eq!(state.len(), 2);
        assert_eq!(
            state.get("Photos/a.txt").unwrap().content_hash,
            "acbd18db4cc2f85cedef654fccc4a4d8"
        );
        assert!(state.get("Photos/empty").is_none());
        assert!(state.last_reconciliation_timestamp > 0);
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = TempDir::new().unwrap();
        let state = scan_tree(&dir.path().join("nope"), 42);
        assert!(state.is_empty());
        assert_eq!(state.last_reconciliation_timestamp, 42);
    }
}
