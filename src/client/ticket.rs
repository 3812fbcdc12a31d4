//! Transfer tickets
//!
//! A ticket records how far a chunked upload got, so a later process can
//! pick it up instead of starting again from byte zero. Tickets are JSON
//! files named after the SHA-256 of the relative path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;

/// Persisted progress of one chunked upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTicket {
    pub file_path: String,
    pub content_hash: String,
    pub total_size: u64,
    /// Bytes acknowledged by the server
    pub cursor_offset: u64,
    pub updated_at: DateTime<Utc>,
}

impl TransferTicket {
    pub fn new(file_path: &str, content_hash: &str, total_size: u64, cursor_offset: u64) -> Self {
        Self {
            file_path: file_path.to_string(),
            content_hash: content_hash.to_string(),
            total_size,
            cursor_offset,
            updated_at: Utc::now(),
        }
    }

    /// Whether this ticket describes an upload of the given content
    pub fn matches(&self, content_hash: &str, total_size: u64) -> bool {
        self.content_hash.eq_ignore_ascii_case(content_hash) && self.total_size == total_size
    }
}

/// Directory of transfer tickets
#[derive(Debug, Clone)]
pub struct TicketStore {
    dir: PathBuf,
}

impl TicketStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ticket_path(&self, file_path: &str) -> PathBuf {
        let digest = Sha256::digest(file_path.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// Load the ticket for a path; an unreadable ticket counts as none
    pub async fn load(&self, file_path: &str) -> std::io::Result<Option<TransferTicket>> {
        let path = self.ticket_path(file_path);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_slice::<TransferTicket>(&data) {
            Ok(ticket) if ticket.file_path == file_path => Ok(Some(ticket)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt transfer ticket");
                Ok(None)
            }
        }
    }

    /// Write a ticket, replacing the previous one atomically
    pub async fn save(&self, ticket: &TransferTicket) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.ticket_path(&ticket.file_path);
        let tmp = path.with_extension("json.tmp");

        let data = serde_json::to_vec_pretty(ticket)?;
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await
    }

    /// Forget the ticket for a path
    pub async fn remove(&self, file_path: &str) -> std::io::Result<()> {
        match fs::remove_file(self.ticket_path(file_path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
