//! File routes
//!
//! Endpoints:
//! - GET /files/ - Full snapshot of the caller's tree
//! - GET /files/*path - Download a file
//! - POST /files/*path - Upload a new file (whole or one chunk)
//! - PUT /files/*path - Replace an existing file (whole or one chunk)
//! - GET /uploads/*path - Progress of a chunked upload, for resuming

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use super::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::hash::is_content_hash;
use crate::protocol::{
    TimestampResponse, UploadStatus, CHUNK_OFFSET_HEADER, CONTENT_HASH_HEADER, TOTAL_SIZE_HEADER,
};
use crate::sandbox::normalize_relative;
use crate::snapshot::SyncState;
use crate::state::AppState;
use crate::upload::{ChunkProgress, StagedUpload, UploadError, UploadMode};

/// Create the files router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/", get(list_files))
        .route(
            "/files/*path",
            get(download_file).post(create_file).put(modify_file),
        )
        .route("/uploads/*path", get(upload_status))
}

/// Full snapshot of the caller's tree
async fn list_files(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<SyncState>> {
    Ok(Json(state.snapshots().snapshot_of(&user).await?))
}

/// Send a file's bytes
async fn download_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(path): Path<String>,
) -> Result<Response> {
    let key = normalize_relative(&path)?;
    let data = state.storage().read(&user, &key).await?;

    let filename = key.rsplit('/').next().unwrap_or(&key);
    tracing::debug!(user = %user, path = %key, size = data.len(), "Serving file");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn create_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    receive(&state, &user, &path, &headers, body, UploadMode::Create).await
}

async fn modify_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    receive(&state, &user, &path, &headers, body, UploadMode::Modify).await
}

/// Progress of a chunked upload
async fn upload_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(path): Path<String>,
) -> Result<Json<UploadStatus>> {
    let key = normalize_relative(&path)?;
    Ok(Json(state.uploads().status(&user, &key).await?))
}

// ============================================================================
// Upload handling
// ============================================================================

/// Whole-file upload, or one chunk when the chunk headers are present
async fn receive(
    state: &AppState,
    user: &str,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
    mode: UploadMode,
) -> Result<Response> {
    let key = normalize_relative(path)?;
    let content_hash = header_str(headers, CONTENT_HASH_HEADER)?
        .filter(|h| is_content_hash(h))
        .ok_or(UploadError::InvalidHeader(CONTENT_HASH_HEADER))?
        .to_ascii_lowercase();

    let offset = header_u64(headers, CHUNK_OFFSET_HEADER)?;
    let Some(offset) = offset else {
        check_target(state, user, &key, mode).await?;
        let staged = state.uploads().stage_whole(&body, &content_hash).await?;
        return install(state, user, &key, staged).await;
    };

    let total_size =
        header_u64(headers, TOTAL_SIZE_HEADER)?.ok_or(UploadError::InvalidHeader(TOTAL_SIZE_HEADER))?;

    if offset == 0 {
        check_target(state, user, &key, mode).await?;
        state
            .uploads()
            .begin(user, &key, &content_hash, total_size, mode)
            .await?;
    }

    let progress = state
        .uploads()
        .accept_chunk(user, &key, offset, &content_hash, total_size, &body)
        .await?;

    match progress {
        ChunkProgress::Partial(accepted) => Ok((StatusCode::OK, Json(accepted)).into_response()),
        ChunkProgress::Complete(staged) => install(state, user, &key, staged).await,
    }
}

/// POST needs a free path, PUT an existing file
async fn check_target(state: &AppState, user: &str, key: &str, mode: UploadMode) -> Result<()> {
    let target = state.storage().resolve(user, key)?;
    let existing = tokio::fs::metadata(&target).await.ok();

    if existing.as_ref().is_some_and(|m| m.is_dir()) {
        return Err(AppError::Forbidden(format!("Path is a directory: {}", key)));
    }

    match (mode, existing.is_some()) {
        (UploadMode::Create, true) => Err(UploadError::FileExists(key.to_string()).into()),
        (UploadMode::Modify, false) => Err(UploadError::FileNotFound(key.to_string()).into()),
        _ => Ok(()),
    }
}

/// Move a verified upload into the user's tree and record it
async fn install(state: &AppState, user: &str, key: &str, staged: StagedUpload) -> Result<Response> {
    let installed = state.storage().install(user, key, &staged.staging_path).await;
    let modified = match installed {
        Ok(modified) => modified,
        Err(e) => {
            state.uploads().staging().discard(&staged.staging_path).await;
            return Err(e);
        }
    };

    let server_timestamp = state
        .snapshots()
        .record(user, key, modified, &staged.content_hash)
        .await?;

    tracing::info!(user = %user, path = %key, size = staged.size, "Stored file");
    Ok((StatusCode::CREATED, Json(TimestampResponse { server_timestamp })).into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::from(UploadError::InvalidHeader(name)))
        })
        .transpose()
}

fn header_u64(headers: &HeaderMap, name: &'static str) -> Result<Option<u64>> {
    header_str(headers, name)?
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| AppError::from(UploadError::InvalidHeader(name)))
        })
        .transpose()
}
