//! Wire protocol shared by the server routes and the client
//!
//! File bodies travel as raw bytes; the content hash and the chunk
//! bookkeeping travel in headers so a chunk request is the same shape as a
//! whole-file request plus two extra headers.

use serde::{Deserialize, Serialize};

/// Prefix every API route is mounted under
pub const API_PREFIX: &str = "/API/V1";

/// Whole-file MD5, sent with every upload request (whole or chunk)
pub const CONTENT_HASH_HEADER: &str = "x-content-hash";

/// Bytes already sent before this chunk
pub const CHUNK_OFFSET_HEADER: &str = "x-chunk-offset";

/// Size of the complete file in a chunked upload
pub const TOTAL_SIZE_HEADER: &str = "x-total-size";

/// Basic auth realm advertised on 401
pub const AUTH_REALM: &str = "filebox";

/// Response carrying the server timestamp after a snapshot change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampResponse {
    pub server_timestamp: i64,
}

/// Response to an intermediate chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAccepted {
    pub received: u64,
    pub total_size: u64,
}

/// State of an in-progress chunked upload, used to resume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub path: String,
    pub content_hash: String,
    pub received: u64,
    pub total_size: u64,
}

/// Body of `POST /actions/delete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(alias = "filepath")]
    pub path: String,
}

/// Body of `POST /actions/move` and `POST /actions/copy`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub src: String,
    pub dst: String,
}

/// Body of `POST /users/<name>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub password: String,
}

/// Body of `PUT /users/<name>`: activation or password reset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserUpdateRequest {
    Reset {
        password: String,
        recoverpass_code: String,
    },
    Activate {
        activation_code: String,
    },
}

/// Generic message body for user-management replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error body rendered by the server for every failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
