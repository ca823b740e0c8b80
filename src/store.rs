//! # Store — Guarded Deletion of Artifact Directories
//!
//! Clearing artifacts and removing the configuration directory are the only
//! destructive operations. Both go through [`clear_directory`], which
//! canonicalizes the target and checks it against a [`ProtectedPaths`]
//! denylist before touching anything. A misconfigured moduli directory that
//! resolves to `/`, `/usr` or the user's home fails loudly and deletes nothing.
//!
//! Entries are inspected with `symlink_metadata`, so a symlink inside the
//! directory is unlinked rather than followed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ModuliError, Result};

/// System locations that must never be emptied.
const SYSTEM_PATHS: &[&str] = &[
    "/", "/home", "/usr", "/usr/local", "/var", "/opt", "/usr/opt", "/var/opt", "/etc", "/bin",
    "/sbin", "/lib", "/boot", "/root", "/tmp",
];

/// Denylist of directories the destructive operations refuse to act on.
#[derive(Debug, Clone)]
pub struct ProtectedPaths {
    paths: Vec<PathBuf>,
}

impl Default for ProtectedPaths {
    fn default() -> Self {
        let mut protected = SYSTEM_PATHS
            .iter()
            .fold(ProtectedPaths::none(), |p, path| p.with(*path));
        if let Some(home) = std::env::var_os("HOME") {
            protected = protected.with(home);
        }
        protected
    }
}

impl ProtectedPaths {
    /// An empty denylist. Only useful for tests and callers that build their own.
    pub fn none() -> Self {
        ProtectedPaths { paths: Vec::new() }
    }

    /// Add a path; it is canonicalized when it exists so that symlinked
    /// spellings of the same directory match.
    pub fn with(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = fs::canonicalize(&path).unwrap_or(path);
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        self
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Canonicalize `dir` and refuse it if it is protected or not a directory.
    pub fn check(&self, dir: &Path) -> Result<PathBuf> {
        if self.contains(dir) {
            return Err(ModuliError::ProtectedPath(dir.to_path_buf()));
        }
        let resolved = fs::canonicalize(dir).map_err(ModuliError::io("resolve", dir))?;
        if self.contains(&resolved) {
            return Err(ModuliError::ProtectedPath(resolved));
        }
        if !resolved.is_dir() {
            return Err(ModuliError::NotADirectory(resolved));
        }
        Ok(resolved)
    }
}

/// Delete every entry directly under `dir`, leaving `dir` in place.
/// Returns the number of entries removed.
pub fn clear_directory(dir: &Path, protected: &ProtectedPaths) -> Result<usize> {
    let dir = protected.check(dir)?;

    // Scan first so nothing is deleted if the listing fails part way.
    let entries = fs::read_dir(&dir)
        .map_err(ModuliError::io("list", &dir))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()
        .map_err(ModuliError::io("list", &dir))?;

    for path in &entries {
        let meta = fs::symlink_metadata(path).map_err(ModuliError::io("stat", path))?;
        if meta.is_dir() {
            fs::remove_dir_all(path).map_err(ModuliError::io("remove", path))?;
        } else {
            fs::remove_file(path).map_err(ModuliError::io("remove", path))?;
        }
        debug!(path = %path.display(), "removed");
    }
    info!(dir = %dir.display(), removed = entries.len(), "cleared directory");
    Ok(entries.len())
}

/// Delete `dir` and everything in it. A missing directory is not an error.
pub fn remove_directory(dir: &Path, protected: &ProtectedPaths) -> Result<bool> {
    if fs::symlink_metadata(dir).is_err() {
        return Ok(false);
    }
    let resolved = protected.check(dir)?;
    clear_directory(&resolved, protected)?;
    fs::remove_dir(&resolved).map_err(ModuliError::io("remove", &resolved))?;
    Ok(true)
}
