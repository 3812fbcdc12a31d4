//! Sync state persistence
//!
//! The snapshot model only talks to this narrow interface. SQLite is the
//! production backend; the in-memory store backs tests and embedded use.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::RwLock;

use super::types::{Snapshot, SnapshotEntry, SyncState};

/// Errors raised by a sync store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No sync state for user: {0}")]
    NotFound(String),

    #[error("No snapshot entry for {path} (user {user})")]
    EntryNotFound { user: String, path: String },

    #[error("Sync state for {user} changed concurrently (expected timestamp {expected})")]
    Conflict { user: String, expected: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage for per-user sync state
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Fetch the state of a user, if any
    async fn get(&self, user: &str) -> Result<Option<SyncState>, StoreError>;

    /// Replace the state of a user
    async fn put(&self, user: &str, state: &SyncState) -> Result<(), StoreError>;

    /// Set the timestamp to `new` only if it is currently `expected`
    async fn compare_and_swap_timestamp(
        &self,
        user: &str,
        expected: i64,
        new: i64,
    ) -> Result<bool, StoreError>;

    /// Forget a user entirely
    async fn delete(&self, user: &str) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store
#[derive(Default)]
pub struct MemorySyncStore {
    states: RwLock<HashMap<String, SyncState>>,
}

impl MemorySyncStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn get(&self, user: &str) -> Result<Option<SyncState>, StoreError> {
        let states = self.states.read().await;
        Ok(states.get(user).cloned())
    }

    async fn put(&self, user: &str, state: &SyncState) -> Result<(), StoreError> {
        let mut states = self.states.write().await;
        states.insert(user.to_string(), state.clone());
        Ok(())
    }

    async fn compare_and_swap_timestamp(
        &self,
        user: &str,
        expected: i64,
        new: i64,
    ) -> Result<bool, StoreError> {
        let mut states = self.states.write().await;
        let state = states
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(user.to_string()))?;

        if state.last_reconciliation_timestamp != expected {
            return Ok(false);
        }
        state.last_reconciliation_timestamp = new;
        Ok(true)
    }

    async fn delete(&self, user: &str) -> Result<(), StoreError> {
        let mut states = self.states.write().await;
        states.remove(user);
        Ok(())
    }
}

// ============================================================================
// SQLite store
// ============================================================================

/// SQLite-backed store using the `sync_states` and `snapshot_entries` tables
#[derive(Clone)]
pub struct SqliteSyncStore {
    pool: SqlitePool,
}

impl SqliteSyncStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStore for SqliteSyncStore {
    async fn get(&self, user: &str) -> Result<Option<SyncState>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT last_reconciliation_timestamp FROM sync_states WHERE username = ?",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;

        let Some((last_reconciliation_timestamp,)) = row else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, (String, i64, String)>(
            r#"
            SELECT path, modified, content_hash
            FROM snapshot_entries
            WHERE username = ?
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        let snapshot: Snapshot = rows
            .into_iter()
            .map(|(path, modified, hash)| (path, SnapshotEntry::new(modified, hash)))
            .collect();

        Ok(Some(SyncState {
            last_reconciliation_timestamp,
            snapshot,
        }))
    }

    async fn put(&self, user: &str, state: &SyncState) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sync_states (username, last_reconciliation_timestamp)
            VALUES (?, ?)
            ON CONFLICT(username) DO UPDATE SET
                last_reconciliation_timestamp = excluded.last_reconciliation_timestamp
            "#,
        )
        .bind(user)
        .bind(state.last_reconciliation_timestamp)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM snapshot_entries WHERE username = ?")
            .bind(user)
            .execute(&mut *tx)
            .await?;

        for (path, entry) in &state.snapshot {
            sqlx::query(
                r#"
                INSERT INTO snapshot_entries (username, path, modified, content_hash)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(user)
            .bind(path)
            .bind(entry.modified)
            .bind(&entry.content_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn compare_and_swap_timestamp(
        &self,
        user: &str,
        expected: i64,
        new: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_states SET last_reconciliation_timestamp = ?
            WHERE username = ? AND last_reconciliation_timestamp = ?
            "#,
        )
        .bind(new)
        .bind(user)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, user: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM snapshot_entries WHERE username = ?")
            .bind(user)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sync_states WHERE username = ?")
            .bind(user)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn sample_state() -> SyncState {
        let mut state = SyncState::empty(100);
        state.record("Photos/a.jpg".to_string(), SnapshotEntry::new(120, "0123456789abcdef0123456789abcdef"));
        state.record("notes.txt".to_string(), SnapshotEntry::new(110, "acbd18db4cc2f85cedef654fccc4a4d8"));
        state
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let pool = create_memory_pool().await.unwrap();
        let store = SqliteSyncStore::new(pool);

        assert!(store.get("pippo").await.unwrap().is_none());

        let state = sample_state();
        store.put("pippo", &state).await.unwrap();
        assert_eq!(store.get("pippo").await.unwrap(), Some(state.clone()));

        // Replacing drops entries that are gone
        let mut smaller = state.clone();
        smaller.remove("notes.txt", 130);
        store.put("pippo", &smaller).await.unwrap();
        let loaded = store.get("pippo").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.last_reconciliation_timestamp, 130);
    }

    #[tokio::test]
    async fn test_sqlite_compare_and_swap() {
        let pool = create_memory_pool().await.unwrap();
        let store = SqliteSyncStore::new(pool);
        store.put("pippo", &SyncState::empty(100)).await.unwrap();

        assert!(!store.compare_and_swap_timestamp("pippo", 99, 150).await.unwrap());
        assert!(store.compare_and_swap_timestamp("pippo", 100, 150).await.unwrap());

        let state = store.get("pippo").await.unwrap().unwrap();
        assert_eq!(state.last_reconciliation_timestamp, 150);
    }

    #[tokio::test]
    async fn test_sqlite_delete() {
        let pool = create_memory_pool().await.unwrap();
        let store = SqliteSyncStore::new(pool);
        store.put("pippo", &sample_state()).await.unwrap();
        store.put("paperino", &sample_state()).await.unwrap();

        store.delete("pippo").await.unwrap();

        assert!(store.get("pippo").await.unwrap().is_none());
        assert_eq!(store.get("paperino").await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_compare_and_swap() {
        let store = MemorySyncStore::new();
        assert!(matches!(
            store.compare_and_swap_timestamp("ghost", 0, 1).await,
            Err(StoreError::NotFound(_))
        ));

        store.put("pippo", &SyncState::empty(5)).await.unwrap();
        assert!(store.compare_and_swap_timestamp("pippo", 5, 6).await.unwrap());
        assert!(!store.compare_and_swap_timestamp("pippo", 5, 7).await.unwrap());
    }
}
