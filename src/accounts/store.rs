//! Account persistence

use sqlx::SqlitePool;

use super::types::{hash_password, new_code, password_improvements, Account, AccountError};

type Result<T> = std::result::Result<T, AccountError>;

/// Repository for user accounts
pub struct AccountRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AccountRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get an account by username
    pub async fn get(&self, username: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT username, password_hash, active, activation_code,
                   recoverpass_code, created_at
            FROM accounts
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(account)
    }

    async fn require(&self, username: &str) -> Result<Account> {
        self.get(username)
            .await?
            .ok_or_else(|| AccountError::UnknownUser(username.to_string()))
    }

    /// Register a new inactive account
    pub async fn register(&self, username: &str, password: &str) -> Result<Account> {
        let improvements = password_improvements(password);
        if !improvements.is_empty() {
            return Err(AccountError::WeakPassword(improvements));
        }

        let account = Account::new(username, password)?;
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (
                username, password_hash, active, activation_code,
                recoverpass_code, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(account.active)
        .bind(&account.activation_code)
        .bind(&account.recoverpass_code)
        .bind(&account.created_at)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AccountError::AlreadyExists(username.to_string()));
        }

        tracing::info!(user = %username, "Registered account");
        Ok(account)
    }

    /// Activate an account with the code issued at registration
    pub async fn activate(&self, username: &str, code: &str) -> Result<()> {
        let account = self.require(username).await?;
        if account.active {
            return Err(AccountError::AlreadyActive(username.to_string()));
        }
        if account.activation_code.as_deref() != Some(code) {
            return Err(AccountError::WrongCode(username.to_string()));
        }

        sqlx::query("UPDATE accounts SET active = 1, activation_code = NULL WHERE username = ?")
            .bind(username)
            .execute(self.pool)
            .await?;

        tracing::info!(user = %username, "Activated account");
        Ok(())
    }

    /// Issue a password recovery code, replacing any previous one
    pub async fn request_reset(&self, username: &str) -> Result<String> {
        self.require(username).await?;
        let code = new_code();

        sqlx::query("UPDATE accounts SET recoverpass_code = ? WHERE username = ?")
            .bind(&code)
            .bind(username)
            .execute(self.pool)
            .await?;

        Ok(code)
    }

    /// Set a new password using a recovery code
    pub async fn reset_password(&self, username: &str, code: &str, password: &str) -> Result<()> {
        let account = self.require(username).await?;
        if account.recoverpass_code.as_deref() != Some(code) {
            return Err(AccountError::WrongCode(username.to_string()));
        }

        let improvements = password_improvements(password);
        if !improvements.is_empty() {
            return Err(AccountError::WeakPassword(improvements));
        }

        let password_hash = hash_password(password)?;
        sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = ?, recoverpass_code = NULL
            WHERE username = ?
            "#,
        )
        .bind(&password_hash)
        .bind(username)
        .execute(self.pool)
        .await?;

        tracing::info!(user = %username, "Password reset");
        Ok(())
    }

    /// Check credentials; only active accounts can authenticate
    pub async fn verify(&self, username: &str, password: &str) -> Result<bool> {
        Ok(self
            .get(username)
            .await?
            .is_some_and(|account| account.active && account.verify_password(password)))
    }

    /// Delete an account
    pub async fn delete(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE username = ?")
            .bind(username)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
