//! Virtual node model: directory entries and generated files.

use std::time::SystemTime;

use crate::path;

/// Default mode for directories in listings.
pub const DIR_MODE: u32 = 0o755;

/// Kind of directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// A directory entry — the unified metadata view returned by `stat` and
/// `read_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry (not the full path).
    pub name: String,
    /// Kind of entry.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Unix permission bits (0 when the producer did not set any).
    pub mode: u32,
    /// Last modification time, if known.
    pub modified: Option<SystemTime>,
}

impl DirEntry {
    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
            size: 0,
            mode: DIR_MODE,
            modified: None,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
            mode: 0,
            modified: None,
        }
    }

    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Returns true if this entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// A generated virtual file.
///
/// The dispatcher pre-populates `target` and `path` before handing the file
/// to a generator; the generator fills in `data` (and optionally `mode` and
/// `modified`) and returns the completed record. Once cached, the record is
/// immutable until invalidation.
#[derive(Debug, Clone)]
pub struct File {
    target: String,
    path: String,
    /// File contents.
    pub data: Vec<u8>,
    /// Unix permission bits. Defaults to 0.
    pub mode: u32,
    /// Modification time. Defaults to `None`.
    pub modified: Option<SystemTime>,
}

impl File {
    pub(crate) fn new(target: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            path: path.into(),
            data: Vec::new(),
            mode: 0,
            modified: None,
        }
    }

    /// The absolute virtual path that was requested.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The canonical path of the owning generator. For a plain file
    /// generator this equals `target`; for a file server it is the server's
    /// registered prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The requested path relative to the owning generator, or `.` when the
    /// generator itself was requested.
    pub fn relative(&self) -> &str {
        path::relative_to(&self.path, &self.target).unwrap_or(".")
    }

    /// Metadata view of this file, named after the target's final segment.
    pub fn entry(&self) -> DirEntry {
        DirEntry {
            name: path::base(&self.target).to_string(),
            kind: EntryKind::File,
            size: self.data.len() as u64,
            mode: self.mode,
            modified: self.modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kinds() {
        let d = DirEntry::directory("view");
        assert!(d.is_dir());
        assert!(!d.is_file());
        assert_eq!(d.size, 0);
        assert_eq!(d.mode, DIR_MODE);

        let f = DirEntry::file("index.svelte", 14);
        assert!(f.is_file());
        assert_eq!(f.size, 14);
        assert_eq!(f.mode, 0);
        assert!(f.modified.is_none());
    }

    #[test]
    fn test_file_relative() {
        let f = File::new("duo/view/about/_about.svelte", "duo/view");
        assert_eq!(f.relative(), "about/_about.svelte");
        assert_eq!(f.target(), "duo/view/about/_about.svelte");
        assert_eq!(f.path(), "duo/view");

        let same = File::new("a.txt", "a.txt");
        assert_eq!(same.relative(), ".");
    }

    #[test]
    fn test_file_entry() {
        let mut f = File::new("bud/view/index.svelte", "bud/view/index.svelte");
        f.data = b"<h1>index</h1>".to_vec();
        let e = f.entry();
        assert_eq!(e.name, "index.svelte");
        assert_eq!(e.size, 14);
        assert!(e.is_file());
    }
}
