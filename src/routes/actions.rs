//! File actions
//!
//! `POST /actions/move`, `/actions/copy` and `/actions/delete` change the
//! caller's tree and snapshot together and answer with the new server
//! timestamp. Any other action name is 404.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::hash::hash_file;
use crate::protocol::{DeleteRequest, TimestampResponse, TransferRequest};
use crate::sandbox::normalize_relative;
use crate::snapshot::StoreError;
use crate::state::AppState;

/// Create the actions router
pub fn router() -> Router<AppState> {
    Router::new().route("/actions/:action", post(run_action))
}

async fn run_action(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<TimestampResponse>> {
    let server_timestamp = match action.as_str() {
        "delete" => {
            let request: DeleteRequest = parse_body(body)?;
            delete(&state, &user, &request.path).await?
        }
        "move" => {
            let request: TransferRequest = parse_body(body)?;
            move_file(&state, &user, &request.src, &request.dst).await?
        }
        "copy" => {
            let request: TransferRequest = parse_body(body)?;
            copy_file(&state, &user, &request.src, &request.dst).await?
        }
        other => return Err(AppError::NotFound(format!("Unknown action: {}", other))),
    };

    Ok(Json(TimestampResponse { server_timestamp }))
}

fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn delete(state: &AppState, user: &str, path: &str) -> Result<i64> {
    let key = normalize_relative(path)?;
    state.storage().delete(user, &key).await?;
    let ts = state.snapshots().remove(user, &key).await?;

    tracing::info!(user = %user, path = %key, "Deleted file");
    Ok(ts)
}

async fn move_file(state: &AppState, user: &str, src: &str, dst: &str) -> Result<i64> {
    let src = normalize_relative(src)?;
    let dst = normalize_relative(dst)?;
    // Both ends are checked before anything moves
    state.storage().resolve(user, &dst)?;

    state.storage().move_file(user, &src, &dst).await?;
    let ts = match state.snapshots().move_entry(user, &src, &dst).await {
        Err(StoreError::EntryNotFound { .. }) => record_from_disk(state, user, &dst).await?,
        other => other?,
    };

    tracing::info!(user = %user, src = %src, dst = %dst, "Moved file");
    Ok(ts)
}

async fn copy_file(state: &AppState, user: &str, src: &str, dst: &str) -> Result<i64> {
    let src = normalize_relative(src)?;
    let dst = normalize_relative(dst)?;
    state.storage().resolve(user, &dst)?;

    let modified = state.storage().copy_file(user, &src, &dst).await?;
    let ts = match state.snapshots().copy_entry(user, &src, &dst, modified).await {
        Err(StoreError::EntryNotFound { .. }) => record_from_disk(state, user, &dst).await?,
        other => other?,
    };

    tracing::info!(user = %user, src = %src, dst = %dst, "Copied file");
    Ok(ts)
}

/// Record a file whose source had no snapshot entry, hashing it from disk
async fn record_from_disk(state: &AppState, user: &str, key: &str) -> Result<i64> {
    let target = state.storage().resolve(user, key)?;
    let hash = hash_file(&target).await?;
    let modified = crate::storage::modified_time(&target).await?;

    tracing::warn!(user = %user, path = %key, "Snapshot had no entry for source, rehashed");
    Ok(state.snapshots().record(user, key, modified, &hash).await?)
}
