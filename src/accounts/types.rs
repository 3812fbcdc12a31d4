//! Account types and password handling

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Shortest accepted password
pub const MIN_PASSWORD_LEN: usize = 8;

/// A registered user
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub username: String,
    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub active: bool,
    #[serde(skip_serializing)]
    pub activation_code: Option<String>,
    #[serde(skip_serializing)]
    pub recoverpass_code: Option<String>,
    pub created_at: String,
}

impl Account {
    /// New inactive account with a fresh activation code
    pub fn new(username: &str, password: &str) -> Result<Self, AccountError> {
        Ok(Self {
            username: username.to_string(),
            password_hash: hash_password(password)?,
            active: false,
            activation_code: Some(new_code()),
            recoverpass_code: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn verify_password(&self, password: &str) -> bool {
        verify_password(&self.password_hash, password)
    }
}

/// Account errors
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("User already exists: {0}")]
    AlreadyExists(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("User already active: {0}")]
    AlreadyActive(String),

    #[error("Invalid or expired code for user: {0}")]
    WrongCode(String),

    #[error("Password too weak")]
    WeakPassword(Vec<String>),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Argon2id hash of a password with a fresh salt, as a PHC string
pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountError::PasswordHash(e.to_string()))
}

/// Check a password against a stored PHC string; malformed hashes never match
pub fn verify_password(phc: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        tracing::warn!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Random single-use code (activation, password recovery)
pub fn new_code() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Suggestions that would make `password` acceptable; empty when it is
pub fn password_improvements(password: &str) -> Vec<String> {
    let mut improvements = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        improvements.push(format!("Use at least {} characters", MIN_PASSWORD_LEN));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        improvements.push("Add a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        improvements.push("Add an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        improvements.push("Add a digit".to_string());
    }

    improvements
}
