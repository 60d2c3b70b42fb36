//! In-memory filesystem implementation.
//!
//! Serves three roles: base filesystem in tests, mount source for
//! generator-provided subtrees, and sync sink. All data is ephemeral.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::time::SystemTime;
use tokio::sync::RwLock;

use crate::fs::{Fs, WritableFs, not_found};
use crate::node::{DIR_MODE, DirEntry, EntryKind};
use crate::path;

#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Vec<u8>,
        mode: u32,
        modified: SystemTime,
    },
    Directory {
        mode: u32,
    },
}

/// In-memory filesystem.
///
/// Thread-safe via internal `RwLock`. Entries are keyed by full virtual
/// path; the root `.` always exists.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(".".to_string(), Entry::Directory { mode: DIR_MODE });
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Create a filesystem pre-populated with files. Convenient for tests
    /// and mount sources.
    pub async fn from_files(files: &[(&str, &[u8])]) -> Self {
        let fs = Self::new();
        for (p, data) in files {
            fs.write_file(p, data, 0).await.expect("populate memory fs");
        }
        fs
    }

    async fn ensure_parents(&self, p: &str) {
        let segs = path::segments(p);
        let mut entries = self.entries.write().await;
        let mut current = String::new();
        for seg in &segs[..segs.len().saturating_sub(1)] {
            if current.is_empty() {
                current = seg.to_string();
            } else {
                current = format!("{current}/{seg}");
            }
            entries
                .entry(current.clone())
                .or_insert(Entry::Directory { mode: DIR_MODE });
        }
    }
}

#[async_trait]
impl Fs for MemoryFs {
    async fn read(&self, p: &str) -> io::Result<Vec<u8>> {
        let entries = self.entries.read().await;
        match entries.get(p) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {p}"),
            )),
            None => Err(not_found()),
        }
    }

    async fn stat(&self, p: &str) -> io::Result<DirEntry> {
        let entries = self.entries.read().await;
        match entries.get(p) {
            Some(Entry::File {
                data,
                mode,
                modified,
            }) => Ok(DirEntry {
                name: path::base(p).to_string(),
                kind: EntryKind::File,
                size: data.len() as u64,
                mode: *mode,
                modified: Some(*modified),
            }),
            Some(Entry::Directory { mode }) => Ok(DirEntry {
                name: path::base(p).to_string(),
                kind: EntryKind::Dir,
                size: 0,
                mode: *mode,
                modified: None,
            }),
            None => Err(not_found()),
        }
    }

    async fn read_dir(&self, p: &str) -> io::Result<Vec<DirEntry>> {
        let entries = self.entries.read().await;
        match entries.get(p) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {p}"),
                ));
            }
            None => return Err(not_found()),
        }

        let mut result = Vec::new();
        for (entry_path, entry) in entries.iter() {
            if entry_path == "." {
                continue;
            }
            if path::parent(entry_path) != Some(p) {
                continue;
            }
            let name = path::base(entry_path).to_string();
            result.push(match entry {
                Entry::File {
                    data,
                    mode,
                    modified,
                } => DirEntry {
                    name,
                    kind: EntryKind::File,
                    size: data.len() as u64,
                    mode: *mode,
                    modified: Some(*modified),
                },
                Entry::Directory { mode } => DirEntry {
                    name,
                    kind: EntryKind::Dir,
                    size: 0,
                    mode: *mode,
                    modified: None,
                },
            });
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }
}

#[async_trait]
impl WritableFs for MemoryFs {
    async fn write_file(&self, p: &str, data: &[u8], mode: u32) -> io::Result<()> {
        self.ensure_parents(p).await;
        let mut entries = self.entries.write().await;
        if let Some(Entry::Directory { .. }) = entries.get(p) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {p}"),
            ));
        }
        entries.insert(
            p.to_string(),
            Entry::File {
                data: data.to_vec(),
                mode,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn mkdir_all(&self, p: &str, mode: u32) -> io::Result<()> {
        if p == "." {
            return Ok(());
        }
        self.ensure_parents(p).await;
        let mut entries = self.entries.write().await;
        match entries.get(p) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {p}"),
            )),
            None => {
                entries.insert(p.to_string(), Entry::Directory { mode });
                Ok(())
            }
        }
    }

    async fn remove(&self, p: &str) -> io::Result<()> {
        if p == "." {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot remove root directory",
            ));
        }
        let mut entries = self.entries.write().await;
        if let Some(Entry::Directory { .. }) = entries.get(p) {
            let has_children = entries.keys().any(|k| path::parent(k) == Some(p));
            if has_children {
                return Err(io::Error::new(
                    io::ErrorKind::DirectoryNotEmpty,
                    format!("directory not empty: {p}"),
                ));
            }
        }
        entries.remove(p).ok_or_else(not_found)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryFs::new();
        fs.write_file("test.txt", b"hello world", 0).await.unwrap();
        let data = fs.read("test.txt").await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let fs = MemoryFs::new();
        let result = fs.read("nonexistent.txt").await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_nested_directories() {
        let fs = MemoryFs::new();
        fs.write_file("a/b/c/file.txt", b"nested", 0).await.unwrap();

        assert!(fs.stat("a").await.unwrap().is_dir());
        assert!(fs.stat("a/b").await.unwrap().is_dir());
        assert!(fs.stat("a/b/c").await.unwrap().is_dir());
        assert_eq!(fs.read("a/b/c/file.txt").await.unwrap(), b"nested");
    }

    #[tokio::test]
    async fn test_read_dir_sorted() {
        let fs = MemoryFs::new();
        fs.write_file("b.txt", b"b", 0).await.unwrap();
        fs.write_file("a.txt", b"a", 0).await.unwrap();
        fs.mkdir_all("subdir", DIR_MODE).await.unwrap();

        let entries = fs.read_dir(".").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "subdir"]);
    }

    #[tokio::test]
    async fn test_read_dir_of_file_fails() {
        let fs = MemoryFs::new();
        fs.write_file("file.txt", b"data", 0).await.unwrap();
        let result = fs.read_dir("file.txt").await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotADirectory);
    }

    #[tokio::test]
    async fn test_stat_mode_and_size() {
        let fs = MemoryFs::new();
        fs.write_file("bin/run.sh", b"#!/bin/sh", 0o755).await.unwrap();
        let e = fs.stat("bin/run.sh").await.unwrap();
        assert!(e.is_file());
        assert_eq!(e.size, 9);
        assert_eq!(e.mode, 0o755);
    }

    #[tokio::test]
    async fn test_remove_file_and_dir() {
        let fs = MemoryFs::new();
        fs.write_file("dir/file.txt", b"data", 0).await.unwrap();

        let result = fs.remove("dir").await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::DirectoryNotEmpty);

        fs.remove("dir/file.txt").await.unwrap();
        fs.remove("dir").await.unwrap();
        assert!(!fs.exists("dir").await);
    }

    #[tokio::test]
    async fn test_overwrite_file() {
        let fs = MemoryFs::new();
        fs.write_file("file.txt", b"first", 0).await.unwrap();
        fs.write_file("file.txt", b"second", 0).await.unwrap();
        assert_eq!(fs.read("file.txt").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_root_always_exists() {
        let fs = MemoryFs::new();
        assert!(fs.stat(".").await.unwrap().is_dir());
        assert!(fs.read_dir(".").await.unwrap().is_empty());
        let result = fs.remove(".").await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_from_files() {
        let fs = MemoryFs::from_files(&[("view/a.txt", b"a"), ("view/b.txt", b"b")]).await;
        assert_eq!(fs.read("view/a.txt").await.unwrap(), b"a");
        let names: Vec<_> = fs
            .read_dir("view")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
