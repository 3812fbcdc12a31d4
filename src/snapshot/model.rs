//! Snapshot model
//!
//! Applies snapshot-affecting operations to a user's `SyncState`. Mutations
//! are serialized by a writer lock and committed with a timestamp
//! compare-and-swap before the full state is written back, so a second
//! process writing the same store surfaces as `StoreError::Conflict`.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::now_timestamp;
use super::store::{StoreError, SyncStore};
use super::types::{SnapshotEntry, SyncState};

pub struct SnapshotModel {
    store: Arc<dyn SyncStore>,
    writer: Mutex<()>,
}

impl SnapshotModel {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
        }
    }

    /// Install the initial state of a freshly created account
    pub async fn create(&self, user: &str, state: SyncState) -> Result<(), StoreError> {
        let _guard = self.writer.lock().await;
        self.store.put(user, &state).await
    }

    /// Forget a user's state
    pub async fn drop_user(&self, user: &str) -> Result<(), StoreError> {
        let _guard = self.writer.lock().await;
        self.store.delete(user).await
    }

    /// Immutable copy of the user's state, as sent for a full listing
    pub async fn snapshot_of(&self, user: &str) -> Result<SyncState, StoreError> {
        self.store
            .get(user)
            .await?
            .ok_or_else(|| StoreError::NotFound(user.to_string()))
    }

    /// Entry for a single path
    pub async fn entry(&self, user: &str, path: &str) -> Result<Option<SnapshotEntry>, StoreError> {
        Ok(self.snapshot_of(user).await?.get(path).cloned())
    }

    /// Insert or overwrite the entry for `path`
    ///
    /// Returns the recorded modification time.
    pub async fn record(
        &self,
        user: &str,
        path: &str,
        modified: i64,
        content_hash: &str,
    ) -> Result<i64, StoreError> {
        self.mutate(user, |state| {
            state.record(path.to_string(), SnapshotEntry::new(modified, content_hash));
            Ok(modified)
        })
        .await
    }

    /// Delete the entry for `path`
    ///
    /// Returns the new reconciliation timestamp.
    pub async fn remove(&self, user: &str, path: &str) -> Result<i64, StoreError> {
        let now = now_timestamp();
        self.mutate(user, |state| {
            if state.remove(path, now).is_none() {
                tracing::debug!(user = %user, path = %path, "Removed path had no snapshot entry");
            }
            Ok(state.last_reconciliation_timestamp)
        })
        .await
    }

    /// Re-key `src` as `dst`, keeping its hash
    ///
    /// Returns the modification time given to `dst`.
    pub async fn move_entry(&self, user: &str, src: &str, dst: &str) -> Result<i64, StoreError> {
        let now = now_timestamp();
        self.mutate(user, |state| {
            let entry = state.remove(src, now).ok_or_else(|| StoreError::EntryNotFound {
                user: user.to_string(),
                path: src.to_string(),
            })?;
            state.record(dst.to_string(), SnapshotEntry::new(now, entry.content_hash));
            Ok(now)
        })
        .await
    }

    /// Add `dst` with the hash of `src`
    pub async fn copy_entry(
        &self,
        user: &str,
        src: &str,
        dst: &str,
        modified: i64,
    ) -> Result<i64, StoreError> {
        self.mutate(user, |state| {
            let hash = state
                .get(src)
                .map(|entry| entry.content_hash.clone())
                .ok_or_else(|| StoreError::EntryNotFound {
                    user: user.to_string(),
                    path: src.to_string(),
                })?;
            state.record(dst.to_string(), SnapshotEntry::new(modified, hash));
            Ok(modified)
        })
        .await
    }

    async fn mutate<T, F>(&self, user: &str, apply: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut SyncState) -> Result<T, StoreError>,
    {
        let _guard = self.writer.lock().await;

        let mut state = self.snapshot_of(user).await?;
        let before = state.last_reconciliation_timestamp;
        let out = apply(&mut state)?;

        if !self
            .store
            .compare_and_swap_timestamp(user, before, state.last_reconciliation_timestamp)
            .await?
        {
            return Err(StoreError::Conflict {
                user: user.to_string(),
                expected: before,
            });
        }
        self.store.put(user, &state).await?;

        Ok(out)
    }
}
