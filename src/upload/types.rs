//! Upload types

use std::path::PathBuf;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{ChunkAccepted, UploadStatus};

// ============================================================================
// Constants
// ============================================================================

/// Session expiry time: 24 hours
pub const SESSION_EXPIRY_HOURS: i64 = 24;

// ============================================================================
// Session Types
// ============================================================================

/// Whether an upload creates a new file or replaces an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// POST: the target must not exist yet
    Create,
    /// PUT: the target must already exist
    Modify,
}

/// Chunked upload in progress for one (user, path)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session ID, also names the staging file
    pub id: Uuid,

    pub username: String,

    /// Normalized user-relative path
    pub path: String,

    /// MD5 of the complete file
    pub content_hash: String,

    /// Total file size in bytes
    pub total_size: u64,

    /// Bytes appended so far; the only acceptable next offset
    pub received: u64,

    pub mode: UploadMode,

    /// Where chunks are assembled
    pub staging_path: PathBuf,

    pub created_at: DateTime<Utc>,

    /// Pushed forward on every accepted chunk
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        username: &str,
        path: &str,
        content_hash: &str,
        total_size: u64,
        mode: UploadMode,
        staging_path: PathBuf,
        expiry_hours: i64,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            path: path.to_string(),
            content_hash: content_hash.to_string(),
            total_size,
            received: 0,
            mode,
            staging_path,
            created_at: now,
            expires_at: now + chrono::Duration::hours(expiry_hours),
        }
    }

    /// Check if session has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if every byte has been received
    pub fn is_complete(&self) -> bool {
        self.received == self.total_size
    }

    pub fn status(&self) -> UploadStatus {
        UploadStatus {
            path: self.path.clone(),
            content_hash: self.content_hash.clone(),
            received: self.received,
            total_size: self.total_size,
        }
    }
}

/// Result of accepting one chunk
#[derive(Debug)]
pub enum ChunkProgress {
    /// More chunks are expected
    Partial(ChunkAccepted),
    /// The last chunk arrived and the assembled file matches its hash
    Complete(StagedUpload),
}

/// A verified file in the staging directory, ready to be installed
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub staging_path: PathBuf,
    pub content_hash: String,
    pub size: u64,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No upload in progress for {0}")]
    SessionNotFound(String),

    #[error("Upload session expired: {0}")]
    SessionExpired(String),

    #[error("Chunk does not belong to the upload in progress for {0}")]
    SessionChanged(String),

    #[error("Chunk offset mismatch: expected {expected}, got {actual}")]
    OffsetMismatch { expected: u64, actual: u64 },

    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Upload exceeds declared size: {received} of {total_size} bytes")]
    SizeExceeded { received: u64, total_size: u64 },

    #[error("Invalid header {0}")]
    InvalidHeader(&'static str),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::SessionExpired(_) => StatusCode::GONE,
            Self::SessionChanged(_) => StatusCode::CONFLICT,
            Self::OffsetMismatch { .. } => StatusCode::CONFLICT,
            Self::HashMismatch { .. } => StatusCode::CONFLICT,
            Self::SizeExceeded { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidHeader(_) => StatusCode::BAD_REQUEST,
            Self::FileExists(_) => StatusCode::FORBIDDEN,
            Self::FileNotFound(_) => StatusCode::NOT_FOUND,
            Self::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionExpired(_) => "SESSION_EXPIRED",
            Self::SessionChanged(_) => "SESSION_CHANGED",
            Self::OffsetMismatch { .. } => "OFFSET_MISMATCH",
            Self::HashMismatch { .. } => "HASH_MISMATCH",
            Self::SizeExceeded { .. } => "SIZE_EXCEEDED",
            Self::InvalidHeader(_) => "INVALID_HEADER",
            Self::FileExists(_) => "FILE_EXISTS",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::StorageError(_) => "STORAGE_ERROR",
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::StorageError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_progress() {
        let mut session = UploadSession::new(
            "pippo",
            "big.bin",
            "acbd18db4cc2f85cedef654fccc4a4d8",
            10,
            UploadMode::Create,
            PathBuf::from("/tmp/staging"),
            SESSION_EXPIRY_HOURS,
        );
        assert!(!session.is_complete());
        assert!(!session.is_expired());

        session.received = 10;
        assert!(session.is_complete());
        assert_eq!(session.status().received, 10);
    }

    #[test]
    fn test_expired_session() {
        let session = UploadSession::new(
            "pippo",
            "big.bin",
            "hash",
            10,
            UploadMode::Modify,
            PathBuf::from("/tmp/staging"),
            -1,
        );
        assert!(session.is_expired());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            UploadError::OffsetMismatch { expected: 4, actual: 0 }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            UploadError::SizeExceeded { received: 11, total_size: 10 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::FileExists("a.txt".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
