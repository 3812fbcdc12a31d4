//! Snapshot model
//!
//! Represents "which files exist, with what content, as of when" for one
//! user: relative path → (mtime, MD5) plus a reconciliation timestamp that
//! advances on every change and never goes backwards.

mod model;
mod scan;
mod store;
mod types;

pub use model::SnapshotModel;
pub use scan::scan_tree;
pub use store::{MemorySyncStore, SqliteSyncStore, StoreError, SyncStore};
pub use types::{Snapshot, SnapshotEntry, SyncState};

/// Current server time in whole seconds since the Unix epoch
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
