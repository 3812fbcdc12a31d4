//! Upload Session Manager
//!
//! Tracks chunked uploads keyed by (user, path). Each session sits behind
//! its own mutex so chunks for one path are appended strictly in order
//! while uploads of different paths proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use super::staging::StagingStore;
use super::types::{
    ChunkProgress, StagedUpload, UploadError, UploadMode, UploadSession, SESSION_EXPIRY_HOURS,
};
use crate::protocol::{ChunkAccepted, UploadStatus};

type SessionKey = (String, String);
type SessionHandle = Arc<Mutex<UploadSession>>;

// ============================================================================
// Session Manager
// ============================================================================

/// Manages upload sessions
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    /// Active sessions indexed by (user, path)
    sessions: RwLock<HashMap<SessionKey, SessionHandle>>,

    staging: StagingStore,

    expiry_hours: i64,
}

impl SessionManager {
    /// Create a new session manager staging into `staging`
    pub fn new(staging: StagingStore) -> Self {
        Self::with_expiry(staging, SESSION_EXPIRY_HOURS)
    }

    /// Create a new session manager with a custom idle expiry
    pub fn with_expiry(staging: StagingStore, expiry_hours: i64) -> Self {
        Self {
            inner: Arc::new(SessionManagerInner {
                sessions: RwLock::new(HashMap::new()),
                staging,
                expiry_hours,
            }),
        }
    }

    pub fn staging(&self) -> &StagingStore {
        &self.inner.staging
    }

    // ========================================================================
    // Whole-file uploads
    // ========================================================================

    /// Stage a single-request upload, verifying its hash
    pub async fn stage_whole(&self, data: &[u8], content_hash: &str) -> Result<StagedUpload, UploadError> {
        let staging_path = self.inner.staging.write_whole(data, content_hash).await?;

        Ok(StagedUpload {
            staging_path,
            content_hash: content_hash.to_string(),
            size: data.len() as u64,
        })
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Start a chunked upload, replacing any session already open for the path
    pub async fn begin(
        &self,
        username: &str,
        path: &str,
        content_hash: &str,
        total_size: u64,
        mode: UploadMode,
    ) -> Result<UploadSession, UploadError> {
        let id = uuid::Uuid::new_v4();
        let staging_path = self.inner.staging.staging_path(id);
        self.inner.staging.create(&staging_path).await?;

        let mut session = UploadSession::new(
            username,
            path,
            content_hash,
            total_size,
            mode,
            staging_path,
            self.inner.expiry_hours,
        );
        session.id = id;

        let previous = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.insert(key(username, path), Arc::new(Mutex::new(session.clone())))
        };

        if let Some(previous) = previous {
            let previous = previous.lock().await;
            self.inner.staging.discard(&previous.staging_path).await;
            tracing::info!(
                session_id = %previous.id,
                user = %username,
                path = %path,
                "Restarted upload, previous session discarded"
            );
        }

        tracing::info!(
            session_id = %session.id,
            user = %username,
            path = %path,
            total_size = total_size,
            mode = ?mode,
            "Created upload session"
        );

        Ok(session)
    }

    /// Append a chunk at `offset`
    ///
    /// The chunk must continue exactly where the session left off and carry
    /// the same whole-file hash and total size the session was opened with.
    /// When the last byte arrives the staging file is verified and the
    /// session is closed.
    pub async fn accept_chunk(
        &self,
        username: &str,
        path: &str,
        offset: u64,
        content_hash: &str,
        total_size: u64,
        data: &[u8],
    ) -> Result<ChunkProgress, UploadError> {
        let handle = self.handle(username, path).await?;
        let mut session = handle.lock().await;

        if session.is_expired() {
            drop(session);
            self.close(username, path, &handle).await;
            return Err(UploadError::SessionExpired(path.to_string()));
        }

        if !session.content_hash.eq_ignore_ascii_case(content_hash) || session.total_size != total_size {
            return Err(UploadError::SessionChanged(path.to_string()));
        }

        if offset != session.received {
            return Err(UploadError::OffsetMismatch {
                expected: session.received,
                actual: offset,
            });
        }

        let received = session.received + data.len() as u64;
        if received > session.total_size {
            return Err(UploadError::SizeExceeded {
                received,
                total_size: session.total_size,
            });
        }

        self.inner.staging.append(&session.staging_path, data).await?;
        session.received = received;
        session.expires_at = Utc::now() + chrono::Duration::hours(self.inner.expiry_hours);

        tracing::debug!(
            session_id = %session.id,
            offset = offset,
            received = received,
            total_size = session.total_size,
            "Accepted chunk"
        );

        if !session.is_complete() {
            return Ok(ChunkProgress::Partial(ChunkAccepted {
                received,
                total_size: session.total_size,
            }));
        }

        let staged = StagedUpload {
            staging_path: session.staging_path.clone(),
            content_hash: session.content_hash.clone(),
            size: session.total_size,
        };
        let verified = self.inner.staging.verify(&staged.staging_path, &staged.content_hash).await;
        let session_id = session.id;
        drop(session);
        self.close(username, path, &handle).await;

        match verified {
            Ok(()) => {
                tracing::info!(session_id = %session_id, path = %path, "Upload session completed");
                Ok(ChunkProgress::Complete(staged))
            }
            Err(e) => {
                self.inner.staging.discard(&staged.staging_path).await;
                tracing::warn!(session_id = %session_id, path = %path, error = %e, "Assembled upload rejected");
                Err(e)
            }
        }
    }

    /// Progress of the upload in progress for a path
    pub async fn status(&self, username: &str, path: &str) -> Result<UploadStatus, UploadError> {
        let handle = self.handle(username, path).await?;
        let session = handle.lock().await;

        if session.is_expired() {
            return Err(UploadError::SessionNotFound(path.to_string()));
        }
        Ok(session.status())
    }

    /// Cancel the upload in progress for a path
    pub async fn cancel(&self, username: &str, path: &str) -> Result<(), UploadError> {
        let handle = self.handle(username, path).await?;
        let staging_path = handle.lock().await.staging_path.clone();
        self.close(username, path, &handle).await;
        self.inner.staging.discard(&staging_path).await;

        tracing::info!(user = %username, path = %path, "Upload session cancelled");
        Ok(())
    }

    /// Cancel every upload of a user
    pub async fn cancel_user(&self, username: &str) -> usize {
        let removed: Vec<SessionHandle> = {
            let mut sessions = self.inner.sessions.write().await;
            let keys: Vec<SessionKey> = sessions
                .keys()
                .filter(|(user, _)| user == username)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| sessions.remove(k)).collect()
        };

        for handle in &removed {
            let session = handle.lock().await;
            self.inner.staging.discard(&session.staging_path).await;
        }

        removed.len()
    }

    async fn handle(&self, username: &str, path: &str) -> Result<SessionHandle, UploadError> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(&key(username, path))
            .cloned()
            .ok_or_else(|| UploadError::SessionNotFound(path.to_string()))
    }

    /// Drop the map entry if it still refers to `handle`
    async fn close(&self, username: &str, path: &str, handle: &SessionHandle) {
        let mut sessions = self.inner.sessions.write().await;
        let k = key(username, path);
        if sessions.get(&k).is_some_and(|current| Arc::ptr_eq(current, handle)) {
            sessions.remove(&k);
        }
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    /// Get session count
    pub async fn session_count(&self) -> usize {
        let sessions = self.inner.sessions.read().await;
        sessions.len()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Clean up expired sessions
    ///
    /// Returns the number of sessions cleaned up
    pub async fn cleanup_expired(&self) -> usize {
        let handles: Vec<(SessionKey, SessionHandle)> = {
            let sessions = self.inner.sessions.read().await;
            sessions.iter().map(|(k, h)| (k.clone(), h.clone())).collect()
        };

        let mut count = 0;
        for ((username, path), handle) in handles {
            let session = handle.lock().await;
            if !session.is_expired() {
                continue;
            }
            let staging_path = session.staging_path.clone();
            let session_id = session.id;
            drop(session);

            self.close(&username, &path, &handle).await;
            self.inner.staging.discard(&staging_path).await;
            count += 1;

            tracing::debug!(session_id = %session_id, path = %path, "Cleaned up expired session");
        }

        if count > 0 {
            tracing::info!(count = count, "Cleaned up expired upload sessions");
        }

        count
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(self, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        })
    }
}

fn key(username: &str, path: &str) -> SessionKey {
    (username.to_string(), path.to_string())
}

// ============================================================================
// Tests
// ============================================================================
