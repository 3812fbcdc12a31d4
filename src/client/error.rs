//! Client error types

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::sandbox::PathViolation;

/// Result type for client operations
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors raised while talking to the server or touching local files
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server answered {status}: {message}")]
    Status {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Local path rejected: {0}")]
    Sandbox(#[from] PathViolation),

    #[error("Local I/O error: {0}")]
    Local(#[from] std::io::Error),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Chunked upload of {path} aborted at offset {offset}: {source}")]
    ChunkAborted {
        path: String,
        offset: u64,
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// HTTP status behind this error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::ChunkAborted { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Failure categories reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, timeout, broken body
    Transport,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    /// Any other status, or a response that could not be understood
    Protocol,
    /// A local path failed validation
    Sandbox,
    /// Local filesystem error
    Local,
    /// A chunked upload stopped part way
    ChunkSequence,
}

/// User-visible projection of a `TransferError`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
    /// Bytes the server had acknowledged when a chunked upload stopped
    pub offset: Option<u64>,
}

impl From<&TransferError> for Failure {
    fn from(error: &TransferError) -> Self {
        let kind = match error {
            TransferError::Transport(_) => FailureKind::Transport,
            TransferError::Status { status, .. } => kind_for_status(*status),
            TransferError::Sandbox(_) => FailureKind::Sandbox,
            TransferError::Local(_) => FailureKind::Local,
            TransferError::InvalidResponse(_) => FailureKind::Protocol,
            TransferError::ChunkAborted { .. } => FailureKind::ChunkSequence,
        };

        let offset = match error {
            TransferError::ChunkAborted { offset, .. } => Some(*offset),
            _ => None,
        };

        Failure {
            kind,
            status: error.status(),
            message: error.to_string(),
            offset,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

fn kind_for_status(status: u16) -> FailureKind {
    match status {
        401 => FailureKind::Unauthorized,
        403 => FailureKind::Forbidden,
        404 => FailureKind::NotFound,
        409 => FailureKind::Conflict,
        _ => FailureKind::Protocol,
    }
}
