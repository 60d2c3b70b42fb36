//! The session: public facade, registration surface, and lifecycle.
//!
//! A [`GenFs`] wraps a base filesystem with the generator tree, the
//! two-tier cache, the change set, and the deferred-cleanup list. Clones
//! share one session. The facade validates paths, flushes pending changes,
//! and wraps errors with the session layer prefix.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::fs::{Fs, WritableFs, invalid_argument, wrap};
use crate::generator::{DirFn, DirGenerator, FileFn, FileGenerator};
use crate::merge::{self, ReadValue};
use crate::node::{DirEntry, File};
use crate::path;
use crate::scoped::Ctx;
use crate::sync;
use crate::tree::{Dir, GenValue, Generator, Tree};

pub(crate) type Cleanup = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Session internals shared by every handle ([`GenFs`] clones, `SubFs`
/// views, [`crate::ScopedFs`] handles).
pub(crate) struct Shared {
    pub(crate) base: Arc<dyn Fs>,
    pub(crate) tree: StdRwLock<Tree>,
    pub(crate) gen_cache: Cache<GenValue>,
    pub(crate) read_cache: Cache<ReadValue>,
    changed: StdMutex<HashSet<String>>,
    pub(crate) cleanups: StdMutex<Vec<Cleanup>>,
    closed: AtomicBool,
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    /// Evict everything dependent on the accumulated change set. Runs at
    /// the start of every facade operation; a no-op when nothing changed.
    fn flush_changes(&self) {
        let keys: Vec<String> = {
            let mut changed = self.changed.lock().unwrap();
            if changed.is_empty() {
                return;
            }
            changed.drain().collect()
        };
        debug!(?keys, "flushing changed paths");
        self.gen_cache.evict_closure(&keys);
        self.read_cache.remove(&keys);
    }
}

/// A generator-backed virtual filesystem session.
///
/// Overlays registered generators on a base filesystem. Reads are
/// memoized; [`GenFs::change`] invalidates exactly the entries whose
/// dependency closure intersects the changed paths; [`GenFs::sync`]
/// materializes a subtree into a writable sink.
#[derive(Clone)]
pub struct GenFs {
    shared: Arc<Shared>,
}

impl GenFs {
    /// Create a session over a base filesystem.
    pub fn new(base: impl Fs + 'static) -> Self {
        Self::new_arc(Arc::new(base))
    }

    /// Create a session over an already-shared base filesystem.
    pub fn new_arc(base: Arc<dyn Fs>) -> Self {
        Self {
            shared: Arc::new(Shared {
                base,
                tree: StdRwLock::new(Tree::default()),
                gen_cache: Cache::new(),
                read_cache: Cache::new(),
                changed: StdMutex::new(HashSet::new()),
                cleanups: StdMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn insert(&self, p: &str, generator: Generator) {
        if !path::valid(p) {
            warn!(path = p, "ignoring generator registered at invalid path");
            return;
        }
        self.shared.tree.write().unwrap().insert(p, generator);
    }

    /// Register a file generator closure at `p`.
    pub fn generate_file<F, Fut>(&self, p: &str, f: F)
    where
        F: Fn(crate::ScopedFs, File) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<File>> + Send + 'static,
    {
        self.file_generator(p, Arc::new(FileFn::new(f)));
    }

    /// Register a dir generator closure at `p`.
    pub fn generate_dir<F, Fut>(&self, p: &str, f: F)
    where
        F: Fn(crate::ScopedFs, Dir) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<Dir>> + Send + 'static,
    {
        self.dir_generator(p, Arc::new(DirFn::new(f)));
    }

    /// Register a file generator at `p`. A later registration at the same
    /// path replaces the prior one.
    pub fn file_generator(&self, p: &str, g: Arc<dyn FileGenerator>) {
        self.insert(p, Generator::File(g));
    }

    /// Register a dir generator at `p`.
    pub fn dir_generator(&self, p: &str, g: Arc<dyn DirGenerator>) {
        self.insert(p, Generator::Dir(g));
    }

    /// Register a file server closure at `p`: it answers for any path
    /// strictly inside that prefix, with `relative` computed per request.
    /// Listing the prefix itself yields an invalid-argument error.
    pub fn serve_file<F, Fut>(&self, p: &str, f: F)
    where
        F: Fn(crate::ScopedFs, File) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<File>> + Send + 'static,
    {
        self.insert(p, Generator::Serve(Arc::new(FileFn::new(f))));
    }

    /// Mount a sub-filesystem at `p`. Reads under the prefix are re-rooted
    /// into the mounted filesystem.
    pub fn mount(&self, p: &str, fs: impl Fs + 'static) {
        self.mount_arc(p, Arc::new(fs));
    }

    /// Mount an already-shared sub-filesystem at `p`.
    pub fn mount_arc(&self, p: &str, fs: Arc<dyn Fs>) {
        self.insert(p, Generator::Mount(fs));
    }

    /// Read a file's bytes.
    pub async fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        self.shared.flush_changes();
        merge::read(&self.shared, &Ctx::default(), name)
            .await
            .map_err(|e| wrap("genfs", "open", name, e))
    }

    /// Get metadata for a file or directory.
    pub async fn stat(&self, name: &str) -> io::Result<DirEntry> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        self.shared.flush_changes();
        merge::stat(&self.shared, &Ctx::default(), name)
            .await
            .map_err(|e| wrap("genfs", "open", name, e))
    }

    /// List a directory, sorted by name.
    pub async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        self.shared.flush_changes();
        merge::read_dir(&self.shared, &Ctx::default(), name)
            .await
            .map_err(|e| wrap("genfs", "open", name, e))
    }

    /// Find paths in the merged tree matching a shell-style pattern.
    pub async fn glob(&self, pattern: &str) -> io::Result<Vec<String>> {
        self.shared.flush_changes();
        crate::glob::glob(&self.shared, &Ctx::default(), pattern).await
    }

    /// A read-only view of this session rooted at `prefix`. The view can
    /// be mounted into another session.
    pub fn sub(&self, prefix: &str) -> io::Result<SubFs> {
        if !path::valid(prefix) {
            return Err(wrap("genfs", "open", prefix, invalid_argument()));
        }
        Ok(SubFs {
            fs: self.clone(),
            prefix: prefix.to_string(),
        })
    }

    /// Mark paths dirty. Entries whose dependency closure intersects the
    /// marked paths are evicted before the next operation; a created or
    /// deleted file also dirties its parent's listing.
    pub fn change(&self, paths: &[&str]) {
        let mut changed = self.shared.changed.lock().unwrap();
        for p in paths {
            changed.insert(p.to_string());
            if let Some(parent) = path::parent(p) {
                changed.insert(parent.to_string());
            }
        }
    }

    /// Register a cleanup to run on [`GenFs::close`].
    pub fn defer(&self, f: impl FnOnce() -> io::Result<()> + Send + 'static) {
        self.shared.cleanups.lock().unwrap().push(Box::new(f));
    }

    /// Cancel the session: subsequent reads fail with
    /// [`io::ErrorKind::Interrupted`], and blocked generators observe the
    /// token through their scoped filesystem.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// Run the deferred cleanups, in registration order, exactly once.
    /// Subsequent calls are no-ops. Cleanup errors are accumulated.
    pub fn close(&self) -> io::Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let cleanups: Vec<Cleanup> = std::mem::take(&mut *self.shared.cleanups.lock().unwrap());
        debug!(count = cleanups.len(), "closing session");
        let mut errors = Vec::new();
        for cleanup in cleanups {
            if let Err(e) = cleanup() {
                errors.push(e.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(io::Error::other(errors.join("; ")))
        }
    }

    /// Materialize the subtree under `prefix` into `sink`, authoritatively:
    /// after a successful sync the sink under `prefix` equals the virtual
    /// view exactly. The read cache is reset first so base files are
    /// re-read once; generator output stays memoized.
    pub async fn sync(&self, sink: &dyn WritableFs, prefix: &str) -> io::Result<()> {
        if !path::valid(prefix) {
            return Err(wrap("genfs", "sync", prefix, invalid_argument()));
        }
        self.shared.flush_changes();
        self.shared.read_cache.reset();
        debug!(prefix, "syncing");
        sync::sync(&self.shared, sink, prefix).await
    }
}

#[async_trait]
impl Fs for GenFs {
    async fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        GenFs::read(self, name).await
    }

    async fn stat(&self, name: &str) -> io::Result<DirEntry> {
        GenFs::stat(self, name).await
    }

    async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
        GenFs::read_dir(self, name).await
    }
}

/// A session view rooted at a prefix.
#[derive(Clone)]
pub struct SubFs {
    fs: GenFs,
    prefix: String,
}

#[async_trait]
impl Fs for SubFs {
    async fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        self.fs.read(&path::join(&self.prefix, name)).await
    }

    async fn stat(&self, name: &str) -> io::Result<DirEntry> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        self.fs.stat(&path::join(&self.prefix, name)).await
    }

    async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        self.fs.read_dir(&path::join(&self.prefix, name)).await
    }
}
