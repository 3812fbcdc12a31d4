//! SQLite persistence
//!
//! Holds accounts and per-user sync state.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory pool; every connection would otherwise get
/// its own empty database
#[cfg(test)]
pub(crate) async fn create_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        .await?;

    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Accounts
CREATE TABLE IF NOT EXISTS accounts (
    username TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 0,
    activation_code TEXT,
    recoverpass_code TEXT,
    created_at TEXT NOT NULL
);

-- Per-user reconciliation clock
CREATE TABLE IF NOT EXISTS sync_states (
    username TEXT PRIMARY KEY,
    last_reconciliation_timestamp INTEGER NOT NULL
);

-- Per-user snapshot, one row per regular file
CREATE TABLE IF NOT EXISTS snapshot_entries (
    username TEXT NOT NULL,
    path TEXT NOT NULL,
    modified INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    PRIMARY KEY (username, path)
);

CREATE INDEX IF NOT EXISTS idx_snapshot_entries_user ON snapshot_entries(username);
"#;
