//! Core filesystem traits.
//!
//! [`Fs`] is the read-only triple every backend satisfies: the base
//! filesystem a session overlays, mounted subtrees, and the session itself.
//! [`WritableFs`] adds the mutations the sync engine needs to keep a sink
//! mirrored.

use async_trait::async_trait;
use std::io;

use crate::node::DirEntry;

/// Read-only filesystem interface.
///
/// All operations take forward-slash relative paths; `.` names the root.
/// Implementations signal a missing entry with [`io::ErrorKind::NotFound`]
/// so callers can distinguish "does not exist" from real failures.
#[async_trait]
pub trait Fs: Send + Sync {
    /// Read the entire contents of a file.
    async fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Get metadata for a file or directory.
    async fn stat(&self, path: &str) -> io::Result<DirEntry>;

    /// List entries in a directory, sorted by name.
    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }
}

/// A filesystem that can also be written — the contract a sync sink must
/// satisfy.
#[async_trait]
pub trait WritableFs: Fs {
    /// Write a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, data: &[u8], mode: u32) -> io::Result<()>;

    /// Create a directory and any missing parents.
    async fn mkdir_all(&self, path: &str, mode: u32) -> io::Result<()>;

    /// Remove a file or empty directory.
    async fn remove(&self, path: &str) -> io::Result<()>;
}

/// The canonical "does not exist" error.
pub(crate) fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "file does not exist")
}

/// The canonical "invalid argument" error.
pub(crate) fn invalid_argument() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "invalid argument")
}

/// Wrap an error with a layer prefix, preserving its kind. The layered
/// message (`genfs: open "P". mergefs: open "P". <inner>`) is part of the
/// public contract.
pub(crate) fn wrap(layer: &str, op: &str, path: &str, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), format!("{layer}: {op} {path:?}. {err}"))
}
