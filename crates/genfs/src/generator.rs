//! Generator traits and adapters.
//!
//! A generator is a registered producer that fills in a [`File`] or a
//! [`Dir`]'s children on demand. Generators receive a [`ScopedFs`] whose
//! reads are recorded as dependencies of the generated entry, so that
//! change notifications evict exactly the affected cache entries.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::time::SystemTime;

use crate::node::File;
use crate::scoped::ScopedFs;
use crate::tree::Dir;

/// Produces a single file at a fixed path (or, for a file server, at any
/// path under its prefix).
///
/// The incoming `file` has `target`, `path`, and `relative` pre-populated;
/// the generator fills in `data` (and optionally `mode`/`modified`) and
/// returns the completed record.
#[async_trait]
pub trait FileGenerator: Send + Sync {
    async fn generate_file(&self, fs: ScopedFs, file: File) -> io::Result<File>;
}

/// Produces a directory's children. Each run starts from an empty child
/// registry; the generator registers children on `dir` and returns it.
#[async_trait]
pub trait DirGenerator: Send + Sync {
    async fn generate_dir(&self, fs: ScopedFs, dir: Dir) -> io::Result<Dir>;
}

/// Adapter turning an async closure into a [`FileGenerator`].
pub(crate) struct FileFn<F>(F);

impl<F> FileFn<F> {
    pub(crate) fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> FileGenerator for FileFn<F>
where
    F: Fn(ScopedFs, File) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<File>> + Send + 'static,
{
    async fn generate_file(&self, fs: ScopedFs, file: File) -> io::Result<File> {
        (self.0)(fs, file).await
    }
}

/// Adapter turning an async closure into a [`DirGenerator`].
pub(crate) struct DirFn<F>(F);

impl<F> DirFn<F> {
    pub(crate) fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> DirGenerator for DirFn<F>
where
    F: Fn(ScopedFs, Dir) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<Dir>> + Send + 'static,
{
    async fn generate_dir(&self, fs: ScopedFs, dir: Dir) -> io::Result<Dir> {
        (self.0)(fs, dir).await
    }
}

/// A declarative embedded file: fixed bytes, mode, and modification time.
///
/// Usable wherever a [`FileGenerator`] is expected:
///
/// ```ignore
/// gfs.file_generator("bud/view/index.svelte", Arc::new(EmbedFile {
///     data: b"<h1>index</h1>".to_vec(),
///     ..Default::default()
/// }));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EmbedFile {
    pub data: Vec<u8>,
    pub mode: u32,
    pub modified: Option<SystemTime>,
}

impl EmbedFile {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            mode: 0,
            modified: None,
        }
    }
}

#[async_trait]
impl FileGenerator for EmbedFile {
    async fn generate_file(&self, _fs: ScopedFs, mut file: File) -> io::Result<File> {
        file.data = self.data.clone();
        file.mode = self.mode;
        file.modified = self.modified;
        Ok(file)
    }
}
