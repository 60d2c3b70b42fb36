//! Scoped filesystem handles for generator execution.
//!
//! Every generator runs against a [`ScopedFs`]: reads go through the full
//! merge overlay, but each consulted path is recorded as a dependency of
//! the generated entry, and the chain of in-flight generator keys rides
//! along so recursive activation is cut off with NotFound instead of
//! deadlocking.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex as StdMutex};

use crate::fs::{Fs, invalid_argument, wrap};
use crate::genfs::Shared;
use crate::merge;
use crate::node::DirEntry;
use crate::path;

/// One link in the chain of in-flight generator keys.
pub(crate) struct Chain {
    key: String,
    parent: Option<Arc<Chain>>,
}

/// Per-request context: the dependency accumulator of the generator being
/// run (if any) and the activation chain above it.
#[derive(Clone, Default)]
pub(crate) struct Ctx {
    deps: Option<Arc<StdMutex<HashSet<String>>>>,
    chain: Option<Arc<Chain>>,
}

impl Ctx {
    /// Record a consulted path as a dependency of the current generator.
    pub(crate) fn record(&self, p: &str) {
        if let Some(deps) = &self.deps {
            deps.lock().unwrap().insert(p.to_string());
        }
    }

    /// Whether `key` is already generating somewhere up the chain.
    pub(crate) fn in_chain(&self, key: &str) -> bool {
        let mut link = self.chain.as_ref();
        while let Some(c) = link {
            if c.key == key {
                return true;
            }
            link = c.parent.as_ref();
        }
        false
    }

    /// Context for a nested generator run: fresh accumulator, extended
    /// chain.
    pub(crate) fn child(&self, key: &str, deps: Arc<StdMutex<HashSet<String>>>) -> Ctx {
        Ctx {
            deps: Some(deps),
            chain: Some(Arc::new(Chain {
                key: key.to_string(),
                parent: self.chain.clone(),
            })),
        }
    }
}

/// The filesystem view handed to a generator.
///
/// Cloneable and cheap; clones share the same dependency accumulator.
#[derive(Clone)]
pub struct ScopedFs {
    shared: Arc<Shared>,
    ctx: Ctx,
}

impl ScopedFs {
    pub(crate) fn new(shared: Arc<Shared>, ctx: Ctx) -> Self {
        Self { shared, ctx }
    }

    /// Read a file through the merge overlay, recording the dependency.
    pub async fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        merge::read(&self.shared, &self.ctx, name)
            .await
            .map_err(|e| wrap("genfs", "open", name, e))
    }

    /// Stat a path, recording the dependency.
    pub async fn stat(&self, name: &str) -> io::Result<DirEntry> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        merge::stat(&self.shared, &self.ctx, name)
            .await
            .map_err(|e| wrap("genfs", "open", name, e))
    }

    /// List a directory, recording the dependency on the directory path.
    pub async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
        if !path::valid(name) {
            return Err(wrap("genfs", "open", name, invalid_argument()));
        }
        merge::read_dir(&self.shared, &self.ctx, name)
            .await
            .map_err(|e| wrap("genfs", "open", name, e))
    }

    /// Glob over the merged tree. Every directory traversed is recorded as
    /// a dependency, so additions and removals re-run this generator.
    pub async fn glob(&self, pattern: &str) -> io::Result<Vec<String>> {
        crate::glob::glob(&self.shared, &self.ctx, pattern).await
    }

    /// Register a cleanup to run when the session closes. Generators use
    /// this to tear down resources they started (watchers, processes).
    pub fn defer(&self, f: impl FnOnce() -> io::Result<()> + Send + 'static) {
        self.shared.cleanups.lock().unwrap().push(Box::new(f));
    }
}

#[async_trait]
impl Fs for ScopedFs {
    async fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        ScopedFs::read(self, name).await
    }

    async fn stat(&self, name: &str) -> io::Result<DirEntry> {
        ScopedFs::stat(self, name).await
    }

    async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
        ScopedFs::read_dir(self, name).await
    }
}
