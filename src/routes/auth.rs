//! HTTP Basic authentication

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::accounts::AccountRepository;
use crate::error::AppError;
use crate::state::AppState;

/// Username of an authenticated, active account
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (username, password) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_basic)
            .ok_or(AppError::Unauthorized)?;

        let repo = AccountRepository::new(state.db());
        if !repo.verify(&username, &password).await? {
            tracing::debug!(user = %username, "Rejected credentials");
            return Err(AppError::Unauthorized);
        }

        Ok(AuthUser(username))
    }
}

/// Decode a `Basic <base64(user:password)>` header value
pub fn parse_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = String::from_utf8(BASE64.decode(encoded).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
