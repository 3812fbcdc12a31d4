//! Staging Store
//!
//! Temporary files where uploads are assembled before being installed into
//! a user tree. The staging directory lives on the same filesystem as the
//! storage root so installing is a rename.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::types::UploadError;
use crate::hash::{compute_hash, hash_file};

#[derive(Debug, Clone)]
pub struct StagingStore {
    base_path: PathBuf,
}

impl StagingStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Staging file for an upload session
    pub fn staging_path(&self, id: Uuid) -> PathBuf {
        self.base_path.join(format!("{}.part", id))
    }

    /// Create (or truncate) an empty staging file
    pub async fn create(&self, path: &Path) -> Result<(), UploadError> {
        fs::create_dir_all(&self.base_path).await?;
        fs::File::create(path).await?;
        Ok(())
    }

    /// Append a chunk to a staging file
    pub async fn append(&self, path: &Path, data: &[u8]) -> Result<(), UploadError> {
        let mut file = OpenOptions::new().append(true).open(path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    /// Stage a complete body after checking it against `expected_hash`
    pub async fn write_whole(&self, data: &[u8], expected_hash: &str) -> Result<PathBuf, UploadError> {
        verify_hash(expected_hash, compute_hash(data))?;

        fs::create_dir_all(&self.base_path).await?;
        let path = self.staging_path(Uuid::new_v4());
        fs::write(&path, data).await?;
        Ok(path)
    }

    /// Check an assembled staging file against `expected_hash`
    pub async fn verify(&self, path: &Path, expected_hash: &str) -> Result<(), UploadError> {
        verify_hash(expected_hash, hash_file(path).await?)
    }

    /// Remove a staging file; a missing file is not an error
    pub async fn discard(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
}

fn verify_hash(expected: &str, actual: String) -> Result<(), UploadError> {
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(UploadError::HashMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
