//! Error types for the Filebox server

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::accounts::AccountError;
use crate::protocol::{ErrorResponse, AUTH_REALM};
use crate::sandbox::PathViolation;
use crate::snapshot::StoreError;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Path rejected: {0}")]
    Path(#[from] PathViolation),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Sync store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;

        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication required".to_string(),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Path(e) => {
                tracing::warn!("Rejected path: {}", e);
                (StatusCode::FORBIDDEN, "path_violation", e.to_string())
            }
            AppError::Upload(e) => {
                if let UploadError::OffsetMismatch { expected, .. } = e {
                    details = Some(json!({ "expected_offset": expected }));
                }
                if e.status_code().is_server_error() {
                    tracing::error!("Upload error: {}", e);
                }
                (e.status_code(), e.error_code(), e.to_string())
            }
            AppError::Account(e) => match e {
                AccountError::AlreadyExists(_) => (StatusCode::CONFLICT, "user_exists", e.to_string()),
                AccountError::UnknownUser(_) => (StatusCode::NOT_FOUND, "unknown_user", e.to_string()),
                AccountError::AlreadyActive(_) => {
                    (StatusCode::CONFLICT, "already_active", e.to_string())
                }
                AccountError::WrongCode(_) => (StatusCode::FORBIDDEN, "wrong_code", e.to_string()),
                AccountError::WeakPassword(improvements) => {
                    details = Some(json!({ "improvements": improvements }));
                    (StatusCode::FORBIDDEN, "weak_password", e.to_string())
                }
                AccountError::PasswordHash(msg) => {
                    tracing::error!("Password hashing error: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "Internal server error".to_string(),
                    )
                }
                AccountError::Database(db) => {
                    tracing::error!("Database error: {}", db);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database_error",
                        "Database error".to_string(),
                    )
                }
            },
            AppError::Store(e) => match e {
                StoreError::NotFound(_) | StoreError::EntryNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                StoreError::Conflict { .. } => {
                    tracing::warn!("Sync store conflict: {}", e);
                    (StatusCode::CONFLICT, "conflict", e.to_string())
                }
                StoreError::Database(db) => {
                    tracing::error!("Database error: {}", db);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database_error",
                        "Database error".to_string(),
                    )
                }
            },
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "io_error",
                    "IO error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", AUTH_REALM)) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::Path(PathViolation::Traversal("../x".into())), StatusCode::FORBIDDEN),
            (
                AppError::Account(AccountError::AlreadyExists("pippo".into())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Account(AccountError::WeakPassword(vec!["Add a digit".into()])),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::Store(StoreError::NotFound("pippo".into())),
                StatusCode::NOT_FOUND,
            ),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_unauthorized_challenges() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"filebox\""
        );
    }
}
