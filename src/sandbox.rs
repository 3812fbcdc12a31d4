//! Path sandbox
//!
//! Maps user-relative paths onto absolute storage paths that are guaranteed
//! to stay inside a root directory. Resolution is lexical first (`..` is
//! folded, never allowed to climb above the root), then the deepest existing
//! ancestor is canonicalized so a symlink inside the tree cannot point the
//! result somewhere else.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Longest username accepted as a directory name
pub const MAX_USERNAME_LEN: usize = 64;

/// A path that would leave its sandbox root
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathViolation {
    #[error("Empty path")]
    Empty,

    #[error("Absolute path not allowed: {0}")]
    Absolute(String),

    #[error("Path climbs above its root: {0}")]
    Traversal(String),

    #[error("Invalid path component in: {0}")]
    InvalidComponent(String),

    #[error("Path resolves outside its root: {0}")]
    Escape(String),

    #[error("Invalid username: {0}")]
    InvalidUser(String),
}

/// Sandbox over a storage root holding one directory per user
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root containing every user directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root directory of a single user
    pub fn user_root(&self, username: &str) -> Result<PathBuf, PathViolation> {
        validate_username(username)?;
        Ok(self.root.join(username))
    }

    /// Resolve a user-relative path to an absolute path inside the user's root
    pub fn resolve(&self, username: &str, path: &str) -> Result<PathBuf, PathViolation> {
        let user_root = self.user_root(username)?;
        resolve_within(&user_root, path)
    }
}

/// Check that a username is usable as a single directory name
pub fn validate_username(username: &str) -> Result<(), PathViolation> {
    let valid = !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && !username.starts_with('.')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@' | '+'));

    if valid {
        Ok(())
    } else {
        Err(PathViolation::InvalidUser(username.to_string()))
    }
}

/// Normalize a relative path into its canonical snapshot key
///
/// `Photos/./a/../b.jpg` becomes `Photos/b.jpg`. Backslashes are treated as
/// separators so they cannot smuggle a `..` past the check.
pub fn normalize_relative(path: &str) -> Result<String, PathViolation> {
    if path.contains('\0') {
        return Err(PathViolation::InvalidComponent(path.to_string()));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(PathViolation::Absolute(path.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathViolation::Traversal(path.to_string()));
                }
            }
            other => {
                let mut components = Path::new(other).components();
                let single_normal = matches!(components.next(), Some(Component::Normal(_)))
                    && components.next().is_none();
                if !single_normal || other.contains(':') {
                    return Err(PathViolation::InvalidComponent(path.to_string()));
                }
                segments.push(other);
            }
        }
    }

    if segments.is_empty() {
        return Err(PathViolation::Empty);
    }

    Ok(segments.join("/"))
}

/// Resolve `path` against `root`, rejecting anything that lands outside it
pub fn resolve_within(root: &Path, path: &str) -> Result<PathBuf, PathViolation> {
    let relative = normalize_relative(path)?;
    let resolved = root.join(&relative);

    // Nothing exists yet, so nothing can be a symlink.
    let Ok(canonical_root) = root.canonicalize() else {
        return Ok(resolved);
    };

    let mut probe = resolved.as_path();
    loop {
        if probe.exists() || probe.symlink_metadata().is_ok() {
            let canonical = probe
                .canonicalize()
                .map_err(|_| PathViolation::Escape(path.to_string()))?;
            if !canonical.starts_with(&canonical_root) {
                tracing::warn!(path = %path, resolved = %canonical.display(), "Sandbox escape rejected");
                return Err(PathViolation::Escape(path.to_string()));
            }
            break;
        }
        match probe.parent() {
            Some(parent) if parent.starts_with(root) => probe = parent,
            _ => break,
        }
    }

    Ok(resolved)
}
