//! Per-user file trees
//!
//! Every operation takes a user-relative path and resolves it through the
//! sandbox first; nothing here touches a path that failed validation.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{AppError, Result};
use crate::sandbox::Sandbox;

/// Starter tree written for new accounts when provisioning is enabled
const DEFAULT_TREE: &[(&str, &str)] = &[
    ("WELCOME", "Welcome to Filebox! Put files here and they follow you everywhere.\n"),
    ("Misc/notes.txt", "Anything that does not fit elsewhere.\n"),
    ("Music/playlist.txt", "Songs to sync.\n"),
    ("Photos/album.txt", "Pictures to keep.\n"),
    ("Projects/ideas.txt", "Things to build.\n"),
    ("Work/todo.txt", "Things to finish.\n"),
];

/// File operations on the storage root
#[derive(Debug, Clone)]
pub struct UserStorage {
    sandbox: Sandbox,
}

impl UserStorage {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Absolute path of `path` inside the user's tree
    pub fn resolve(&self, username: &str, path: &str) -> Result<PathBuf> {
        Ok(self.sandbox.resolve(username, path)?)
    }

    pub fn user_root(&self, username: &str) -> Result<PathBuf> {
        Ok(self.sandbox.user_root(username)?)
    }

    /// Create an empty tree for a new user
    pub async fn create_user_root(&self, username: &str) -> Result<PathBuf> {
        let root = self.user_root(username)?;
        fs::create_dir_all(&root).await?;
        Ok(root)
    }

    /// Write the starter tree into a user's root
    pub async fn provision_defaults(&self, username: &str) -> Result<PathBuf> {
        let root = self.create_user_root(username).await?;
        for (path, content) in DEFAULT_TREE {
            let target = self.resolve(username, path)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, content).await?;
        }
        Ok(root)
    }

    /// Remove a user's whole tree
    pub async fn remove_user_tree(&self, username: &str) -> Result<()> {
        let root = self.user_root(username)?;
        match fs::remove_dir_all(&root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `path` names an existing regular file
    pub async fn is_file(&self, username: &str, path: &str) -> Result<bool> {
        let target = self.resolve(username, path)?;
        Ok(fs::metadata(&target).await.map(|m| m.is_file()).unwrap_or(false))
    }

    /// Read a file's contents
    pub async fn read(&self, username: &str, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(username, path)?;
        if !is_regular_file(&target).await {
            return Err(AppError::NotFound(format!("File not found: {}", path)));
        }
        Ok(fs::read(&target).await?)
    }

    /// Move a verified staging file into place, returning its mtime
    pub async fn install(&self, username: &str, path: &str, staged: &Path) -> Result<i64> {
        let target = self.resolve(username, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(staged, &target).await {
            // Staging dir configured on another filesystem
            tracing::debug!(error = %e, "Rename failed, copying staged file");
            fs::copy(staged, &target).await?;
            fs::remove_file(staged).await?;
        }

        modified_time(&target).await
    }

    /// Delete a file and any directories it leaves empty
    pub async fn delete(&self, username: &str, path: &str) -> Result<()> {
        let target = self.resolve(username, path)?;
        if !is_regular_file(&target).await {
            return Err(AppError::NotFound(format!("File not found: {}", path)));
        }

        fs::remove_file(&target).await?;
        self.prune_empty_dirs(username, &target).await
    }

    /// Move a file, creating destination directories and pruning the source's
    pub async fn move_file(&self, username: &str, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(username, src)?;
        let to = self.resolve(username, dst)?;
        if !is_regular_file(&from).await {
            return Err(AppError::NotFound(format!("File not found: {}", src)));
        }
        self.check_destination(username, &from, &to, dst).await?;

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&from, &to).await?;
        self.prune_empty_dirs(username, &from).await
    }

    /// Copy a file, returning the copy's mtime
    pub async fn copy_file(&self, username: &str, src: &str, dst: &str) -> Result<i64> {
        let from = self.resolve(username, src)?;
        let to = self.resolve(username, dst)?;
        if !is_regular_file(&from).await {
            return Err(AppError::NotFound(format!("File not found: {}", src)));
        }
        self.check_destination(username, &from, &to, dst).await?;

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&from, &to).await?;
        modified_time(&to).await
    }

    /// A move or copy target must not be the source itself, a directory, or
    /// sit below an existing file
    async fn check_destination(&self, username: &str, from: &Path, to: &Path, dst: &str) -> Result<()> {
        if from == to || same_file(from, to).await {
            return Err(AppError::Conflict(format!(
                "Source and destination are the same file: {}",
                dst
            )));
        }

        if fs::symlink_metadata(to).await.is_ok_and(|m| m.is_dir()) {
            return Err(AppError::Conflict(format!("Destination is a directory: {}", dst)));
        }

        let root = self.user_root(username)?;
        let mut current = to.parent();
        while let Some(dir) = current {
            if dir == root || !dir.starts_with(&root) {
                break;
            }
            if fs::metadata(dir).await.is_ok_and(|m| !m.is_dir()) {
                return Err(AppError::Conflict(format!(
                    "Destination lies below a file: {}",
                    dst
                )));
            }
            current = dir.parent();
        }

        Ok(())
    }

    /// Remove empty directories above `removed`, stopping at the user root
    async fn prune_empty_dirs(&self, username: &str, removed: &Path) -> Result<()> {
        let root = self.user_root(username)?;
        let mut current = removed.parent();

        while let Some(dir) = current {
            if dir == root || !dir.starts_with(&root) {
                break;
            }
            let mut entries = match fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(_) => break,
            };
            if entries.next_entry().await?.is_some() {
                break;
            }
            fs::remove_dir(dir).await?;
            tracing::debug!(dir = %dir.display(), "Pruned empty directory");
            current = dir.parent();
        }

        Ok(())
    }
}

async fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Whether two existing paths name the same file, through symlinks or hard links
async fn same_file(a: &Path, b: &Path) -> bool {
    let (Ok(canonical_a), Ok(canonical_b)) = (fs::canonicalize(a).await, fs::canonicalize(b).await) else {
        return false;
    };
    if canonical_a == canonical_b {
        return true;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let (Ok(meta_a), Ok(meta_b)) = (fs::metadata(a).await, fs::metadata(b).await) {
            return meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino();
        }
    }

    false
}

/// Modification time in whole seconds since the epoch
pub async fn modified_time(path: &Path) -> Result<i64> {
    let modified = fs::metadata(path).await?.modified()?;
    let secs = modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &tempfile::TempDir) -> UserStorage {
        UserStorage::new(Sandbox::new(dir.path()))
    }

    #[tokio::test]
    async fn test_install_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.create_user_root("pippo").await.unwrap();

        let staged = dir.path().join("staged.part");
        std::fs::write(&staged, b"foo").unwrap();

        let mtime = storage.install("pippo", "docs/a.txt", &staged).await.unwrap();
        assert!(mtime > 0);
        assert!(!staged.exists());
        assert_eq!(storage.read("pippo", "docs/a.txt").await.unwrap(), b"foo");
        assert!(storage.is_file("pippo", "docs/a.txt").await.unwrap());
        assert!(!storage.is_file("pippo", "docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_and_escape() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.create_user_root("pippo").await.unwrap();

        assert!(matches!(
            storage.read("pippo", "nope.txt").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            storage.read("pippo", "../../etc/passwd").await,
            Err(AppError::Path(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_prunes_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let root = storage.create_user_root("pippo").await.unwrap();

        std::fs::create_dir_all(root.join("a/b/c")).unwrap();
        std::fs::write(root.join("a/keep.txt"), b"x").unwrap();
        std::fs::write(root.join("a/b/c/gone.txt"), b"x").unwrap();

        storage.delete("pippo", "a/b/c/gone.txt").await.unwrap();

        assert!(!root.join("a/b").exists());
        assert!(root.join("a/keep.txt").exists());
        assert!(root.exists());
    }

    #[tokio::test]
    async fn test_move_and_copy() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let root = storage.create_user_root("pippo").await.unwrap();

        std::fs::create_dir_all(root.join("old")).unwrap();
        std::fs::write(root.join("old/a.txt"), b"data").unwrap();

        storage.move_file("pippo", "old/a.txt", "new/dir/a.txt").await.unwrap();
        assert!(!root.join("old").exists());
        assert_eq!(std::fs::read(root.join("new/dir/a.txt")).unwrap(), b"data");

        storage.copy_file("pippo", "new/dir/a.txt", "copy.txt").await.unwrap();
        assert_eq!(std::fs::read(root.join("copy.txt")).unwrap(), b"data");
        assert!(root.join("new/dir/a.txt").exists());

        assert!(matches!(
            storage.move_file("pippo", "missing.txt", "x.txt").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            storage.copy_file("pippo", "copy.txt", "../pluto/copy.txt").await,
            Err(AppError::Path(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_onto_itself_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let root = storage.create_user_root("pippo").await.unwrap();
        std::fs::write(root.join("a.txt"), b"foo").unwrap();

        assert!(matches!(
            storage.copy_file("pippo", "a.txt", "a.txt").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            storage.move_file("pippo", "a.txt", "a.txt").await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(std::fs::read(root.join("a.txt")).unwrap(), b"foo");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_aliased_destination_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let root = storage.create_user_root("pippo").await.unwrap();
        std::fs::write(root.join("a.txt"), b"foo").unwrap();
        std::fs::hard_link(root.join("a.txt"), root.join("linked.txt")).unwrap();
        std::os::unix::fs::symlink(root.join("a.txt"), root.join("alias.txt")).unwrap();

        assert!(matches!(
            storage.copy_file("pippo", "a.txt", "linked.txt").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            storage.copy_file("pippo", "a.txt", "alias.txt").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            storage.move_file("pippo", "linked.txt", "a.txt").await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(std::fs::read(root.join("a.txt")).unwrap(), b"foo");
        assert!(root.join("linked.txt").exists());
    }

    #[tokio::test]
    async fn test_destination_must_be_a_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let root = storage.create_user_root("pippo").await.unwrap();
        std::fs::create_dir_all(root.join("Photos")).unwrap();
        std::fs::write(root.join("a.txt"), b"foo").unwrap();
        std::fs::write(root.join("b.txt"), b"bar").unwrap();

        assert!(matches!(
            storage.move_file("pippo", "a.txt", "Photos").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            storage.copy_file("pippo", "a.txt", "b.txt/inner.txt").await,
            Err(AppError::Conflict(_))
        ));
        assert!(root.join("a.txt").is_file());
        assert_eq!(std::fs::read(root.join("b.txt")).unwrap(), b"bar");

        // Overwriting another regular file is allowed
        storage.copy_file("pippo", "a.txt", "b.txt").await.unwrap();
        assert_eq!(std::fs::read(root.join("b.txt")).unwrap(), b"foo");
    }

    #[tokio::test]
    async fn test_provision_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        let root = storage.provision_defaults("pippo").await.unwrap();
        assert!(root.join("WELCOME").is_file());
        assert!(root.join("Photos/album.txt").is_file());

        storage.remove_user_tree("pippo").await.unwrap();
        assert!(!root.exists());
        // Removing again is fine
        storage.remove_user_tree("pippo").await.unwrap();
    }
}
