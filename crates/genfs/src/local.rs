//! Local filesystem adapter.
//!
//! Read-only view of a real directory, usable as the base filesystem of a
//! session. Virtual paths are resolved under `root` and canonicalized, so
//! neither `..` nor a symlink inside the root can reach outside it.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::fs::{Fs, not_found};
use crate::node::{DirEntry, EntryKind};

/// Read-only local filesystem rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Create a local filesystem rooted at the given path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path to an absolute path within the root.
    ///
    /// The path (or, for entries that do not exist yet, its nearest
    /// existing parent) is canonicalized before the containment check, so
    /// symlink indirection cannot escape the root.
    async fn resolve(&self, p: &str) -> io::Result<PathBuf> {
        let full = if p == "." {
            self.root.clone()
        } else {
            self.root.join(p)
        };

        let canonical = match fs::canonicalize(&full).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Missing entry: canonicalize the parent and re-append the
                // name so the check still sees through symlinks. If the
                // parent is missing too, the operation itself will fail
                // with NotFound.
                match full.parent() {
                    Some(parent) => match fs::canonicalize(parent).await {
                        Ok(c) => c.join(full.file_name().unwrap_or_default()),
                        Err(_) => full.clone(),
                    },
                    None => full.clone(),
                }
            }
            Err(e) => return Err(e),
        };

        let canonical_root = fs::canonicalize(&self.root)
            .await
            .unwrap_or_else(|_| self.root.clone());
        if !canonical.starts_with(&canonical_root) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("path escapes root: {p}"),
            ));
        }
        Ok(canonical)
    }
}

fn entry_from_metadata(name: &str, meta: &std::fs::Metadata) -> DirEntry {
    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o777
    };
    #[cfg(not(unix))]
    let mode = if meta.is_dir() { 0o755 } else { 0 };

    DirEntry {
        name: name.to_string(),
        kind: if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        },
        size: if meta.is_dir() { 0 } else { meta.len() },
        mode,
        modified: meta.modified().ok(),
    }
}

#[async_trait]
impl Fs for LocalFs {
    async fn read(&self, p: &str) -> io::Result<Vec<u8>> {
        let full = self.resolve(p).await?;
        match fs::read(&full).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            other => other,
        }
    }

    async fn stat(&self, p: &str) -> io::Result<DirEntry> {
        let full = self.resolve(p).await?;
        let meta = match fs::metadata(&full).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            other => other?,
        };
        let name = crate::path::base(p);
        Ok(entry_from_metadata(name, &meta))
    }

    async fn read_dir(&self, p: &str) -> io::Result<Vec<DirEntry>> {
        let full = self.resolve(p).await?;
        let mut dir = match fs::read_dir(&full).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            other => other?,
        };
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(entry_from_metadata(&name, &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
