//! Filesystem operation abstractions for dependency injection.
//!
//! Provides the [`FileSystemOps`] trait so that step predicates can be
//! unit-tested without touching the real filesystem.  Production code uses
//! [`SystemFileSystemOps`]; tests use `MockFileSystemOps`.
//!
//! Only world-readable paths are probed this way.  Root-owned paths (the
//! sudoers drop-in, keyrings) are probed through `sudo test` / `sudo grep`
//! on the [`Executor`](crate::exec::Executor) instead.

use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;

use anyhow::{Context as _, Result};

/// Abstraction over filesystem queries used by step predicates.
///
/// Implement this trait to swap in a mock during unit tests, keeping step
/// logic independent of real I/O.  The production implementation is
/// [`SystemFileSystemOps`].
pub trait FileSystemOps: Send + Sync + std::fmt::Debug {
    /// Returns `true` if `path` exists on the filesystem.
    fn exists(&self, path: &Path) -> bool;

    /// Returns `true` if `path` is a regular file (not a directory or broken symlink).
    fn is_file(&self, path: &Path) -> bool;

    /// Read the full contents of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Return the permission bits of `path` (e.g. `0o755`).
    ///
    /// # Errors
    ///
    /// Returns an error if the path metadata cannot be read.
    fn file_mode(&self, path: &Path) -> Result<u32>;

    /// Write `contents` to `path`, replacing any existing file.
    ///
    /// Used for staging fetched artifacts at user-writable paths; root-owned
    /// destinations go through `sudo tee` on the
    /// [`Executor`](crate::exec::Executor) instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// Production [`FileSystemOps`] implementation that delegates to [`std::fs`].
#[derive(Debug, Default)]
pub struct SystemFileSystemOps;

impl FileSystemOps for SystemFileSystemOps {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn file_mode(&self, path: &Path) -> Result<u32> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        Ok(meta.permissions().mode() & 0o7777)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Mock [`FileSystemOps`] for unit tests.
///
/// Pre-configure paths, file contents, and modes using the builder-style
/// methods, then pass `Arc::new(mock)` to a test context.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockFileSystemOps {
    existing: Vec<std::path::PathBuf>,
    files: std::collections::HashMap<std::path::PathBuf, String>,
    modes: std::collections::HashMap<std::path::PathBuf, u32>,
    writes: std::sync::Mutex<Vec<(std::path::PathBuf, Vec<u8>)>>,
}

#[cfg(test)]
impl MockFileSystemOps {
    /// Create an empty mock with nothing configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `path` as existing without making it a readable file.
    #[must_use]
    pub fn with_existing(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        let p = path.into();
        if !self.existing.contains(&p) {
            self.existing.push(p);
        }
        self
    }

    /// Register `path` as a regular file with `content` (also marks it as existing).
    #[must_use]
    pub fn with_file(mut self, path: impl Into<std::path::PathBuf>, content: &str) -> Self {
        let p = path.into();
        if !self.existing.contains(&p) {
            self.existing.push(p.clone());
        }
        self.files.insert(p, content.to_string());
        self
    }

    /// Set the mode reported for `path` (also marks it as existing).
    #[must_use]
    pub fn with_mode(mut self, path: impl Into<std::path::PathBuf>, mode: u32) -> Self {
        let p = path.into();
        if !self.existing.contains(&p) {
            self.existing.push(p.clone());
        }
        self.modes.insert(p, mode);
        self
    }

    /// Every `(path, contents)` pair written through the mock, in order.
    pub fn writes(&self) -> Vec<(std::path::PathBuf, Vec<u8>)> {
        self.writes
            .lock()
            .map_or_else(|_| Vec::new(), |g| g.clone())
    }
}

#[cfg(test)]
impl FileSystemOps for MockFileSystemOps {
    fn exists(&self, path: &Path) -> bool {
        self.existing.iter().any(|p| p == path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("mock: no content configured for {}", path.display()))
    }

    fn file_mode(&self, path: &Path) -> Result<u32> {
        self.modes
            .get(path)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("mock: no mode configured for {}", path.display()))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Ok(mut guard) = self.writes.lock() {
            guard.push((path.to_path_buf(), contents.to_vec()));
        }
        Ok(())
    }
}
