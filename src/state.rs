//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::sandbox::Sandbox;
use crate::snapshot::{SnapshotModel, SqliteSyncStore, SyncStore};
use crate::storage::UserStorage;
use crate::upload::{SessionManager, StagingStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    storage: UserStorage,
    snapshots: SnapshotModel,
    uploads: SessionManager,
}

impl AppState {
    /// Create a new application state backed by the SQLite sync store
    pub fn new(config: Config, db: SqlitePool) -> Self {
        let store = Arc::new(SqliteSyncStore::new(db.clone()));
        Self::with_store(config, db, store)
    }

    /// Create a new application state with an explicit sync store
    pub fn with_store(config: Config, db: SqlitePool, store: Arc<dyn SyncStore>) -> Self {
        let storage = UserStorage::new(Sandbox::new(config.storage.root.clone()));
        let uploads = SessionManager::with_expiry(
            StagingStore::new(config.storage.upload_dir()),
            config.upload.session_expiry_hours,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                storage,
                snapshots: SnapshotModel::new(store),
                uploads,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the user file trees
    pub fn storage(&self) -> &UserStorage {
        &self.inner.storage
    }

    /// Get the snapshot model
    pub fn snapshots(&self) -> &SnapshotModel {
        &self.inner.snapshots
    }

    /// Get the upload session manager
    pub fn uploads(&self) -> &SessionManager {
        &self.inner.uploads
    }
}
