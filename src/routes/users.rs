//! User management routes
//!
//! Endpoints:
//! - POST /users/:name - Register
//! - PUT /users/:name - Activate, or reset the password with a recovery code
//! - POST /users/:name/reset - Issue a recovery code
//! - DELETE /users/:name - Delete the caller's own account and files

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use super::auth::AuthUser;
use crate::accounts::AccountRepository;
use crate::error::{AppError, Result};
use crate::protocol::{MessageResponse, RegisterRequest, UserUpdateRequest};
use crate::sandbox::validate_username;
use crate::snapshot::{now_timestamp, scan_tree, SyncState};
use crate::state::AppState;

/// Create the users router
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:name",
            post(register).put(update).delete(delete_account),
        )
        .route("/users/:name/reset", post(request_reset))
}

fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.into(),
    })
}

async fn register(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    validate_username(&name).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let repo = AccountRepository::new(state.db());
    let account = repo.register(&name, &request.password).await?;

    if let Err(e) = set_up_tree(&state, &name).await {
        tracing::error!(user = %name, error = %e, "Account setup failed, rolling back");
        roll_back_registration(&state, &name).await;
        return Err(e);
    }

    // No mail transport; the code goes to the operator log
    tracing::info!(
        user = %name,
        activation_code = account.activation_code.as_deref().unwrap_or_default(),
        "Account created, awaiting activation"
    );

    Ok((StatusCode::CREATED, message("User created, check for the activation code")))
}

/// Create the user's tree and its initial sync state
async fn set_up_tree(state: &AppState, name: &str) -> Result<()> {
    let sync_state = if state.config().storage.provision_defaults {
        let root = state.storage().provision_defaults(name).await?;
        let created_at = now_timestamp();
        tokio::task::spawn_blocking(move || scan_tree(&root, created_at))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
    } else {
        state.storage().create_user_root(name).await?;
        SyncState::empty(now_timestamp())
    };
    state.snapshots().create(name, sync_state).await?;
    Ok(())
}

/// Undo a half-created account so the name can be registered again
async fn roll_back_registration(state: &AppState, name: &str) {
    if let Err(e) = state.storage().remove_user_tree(name).await {
        tracing::warn!(user = %name, error = %e, "Failed to remove partial tree");
    }
    if let Err(e) = state.snapshots().drop_user(name).await {
        tracing::warn!(user = %name, error = %e, "Failed to drop partial sync state");
    }
    if let Err(e) = AccountRepository::new(state.db()).delete(name).await {
        tracing::error!(user = %name, error = %e, "Failed to remove account row");
    }
}

async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UserUpdateRequest>,
) -> Result<Json<MessageResponse>> {
    let repo = AccountRepository::new(state.db());

    match request {
        UserUpdateRequest::Activate { activation_code } => {
            repo.activate(&name, &activation_code).await?;
            Ok(message("User activated"))
        }
        UserUpdateRequest::Reset {
            password,
            recoverpass_code,
        } => {
            repo.reset_password(&name, &recoverpass_code, &password).await?;
            Ok(message("Password changed"))
        }
    }
}

async fn request_reset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let code = AccountRepository::new(state.db()).request_reset(&name).await?;

    tracing::info!(user = %name, recoverpass_code = %code, "Password recovery requested");
    Ok((StatusCode::ACCEPTED, message("Recovery code issued")))
}

async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>> {
    if user != name {
        return Err(AppError::Forbidden("Cannot delete another user".to_string()));
    }

    let cancelled = state.uploads().cancel_user(&name).await;
    state.storage().remove_user_tree(&name).await?;
    state.snapshots().drop_user(&name).await?;
    if !AccountRepository::new(state.db()).delete(&name).await? {
        return Err(AppError::NotFound(format!("Unknown user: {}", name)));
    }

    tracing::info!(user = %name, cancelled_uploads = cancelled, "Account deleted");
    Ok(message("User deleted"))
}
