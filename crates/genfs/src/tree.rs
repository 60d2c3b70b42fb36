//! Generator tree: a radix of registered generators and the dispatcher
//! that routes a requested path to the right producer.
//!
//! Interior nodes are anonymous directories or registered dir generators;
//! leaves are file generators, file servers, or mounts. Registering a path
//! with intermediate segments implicitly creates the anonymous interior
//! nodes, so `stat`/`read_dir` on ancestor paths succeed.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex as StdMutex};

use tracing::debug;

use crate::fs::{Fs, invalid_argument, not_found};
use crate::generator::{DirFn, DirGenerator, FileFn, FileGenerator};
use crate::genfs::Shared;
use crate::node::{DirEntry, File};
use crate::path;
use crate::scoped::{Ctx, ScopedFs};

/// A registered producer, dispatched by kind.
#[derive(Clone)]
pub(crate) enum Generator {
    /// Produces one file at its registered path.
    File(Arc<dyn FileGenerator>),
    /// Produces a directory's children on each run.
    Dir(Arc<dyn DirGenerator>),
    /// Answers for any path strictly inside its prefix.
    Serve(Arc<dyn FileGenerator>),
    /// Binds a sub-filesystem under its prefix.
    Mount(Arc<dyn Fs>),
}

/// One radix node: sorted children plus an optional generator.
#[derive(Clone, Default)]
pub(crate) struct Node {
    pub(crate) children: BTreeMap<String, Node>,
    pub(crate) generator: Option<Generator>,
}

/// A radix of generators keyed by slash-separated path.
#[derive(Clone, Default)]
pub(crate) struct Tree {
    pub(crate) root: Node,
}

impl Tree {
    /// Insert a generator, replacing any prior registration at the same
    /// path. Intermediate segments become anonymous directory nodes.
    pub(crate) fn insert(&mut self, rel: &str, generator: Generator) {
        let mut node = &mut self.root;
        for seg in path::segments(rel) {
            node = node.children.entry(seg.to_string()).or_default();
        }
        node.generator = Some(generator);
    }
}

/// A cached generator output.
#[derive(Clone)]
pub(crate) enum GenValue {
    File(Arc<File>),
    Dir(Arc<Dir>),
}

/// A directory under generation.
///
/// Passed to a [`DirGenerator`], which registers the directory's children
/// on it and returns it. Children registered with intermediate segments
/// create anonymous sub-directories, exactly like top-level registration.
pub struct Dir {
    target: String,
    path: String,
    tree: Tree,
    mount: Option<Arc<dyn Fs>>,
}

impl Dir {
    pub(crate) fn new(target: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            path: path.into(),
            tree: Tree::default(),
            mount: None,
        }
    }

    /// The absolute virtual path that was requested.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The path this directory generator is registered at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The requested path relative to this directory, or `.` when the
    /// directory itself was requested.
    pub fn relative(&self) -> &str {
        path::relative_to(&self.path, &self.target).unwrap_or(".")
    }

    /// Register a file generator closure at `rel`.
    pub fn generate_file<F, Fut>(&mut self, rel: &str, f: F)
    where
        F: Fn(ScopedFs, File) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<File>> + Send + 'static,
    {
        self.file_generator(rel, Arc::new(FileFn::new(f)));
    }

    /// Register a dir generator closure at `rel`.
    pub fn generate_dir<F, Fut>(&mut self, rel: &str, f: F)
    where
        F: Fn(ScopedFs, Dir) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<Dir>> + Send + 'static,
    {
        self.dir_generator(rel, Arc::new(DirFn::new(f)));
    }

    /// Register a file generator at `rel`.
    pub fn file_generator(&mut self, rel: &str, g: Arc<dyn FileGenerator>) {
        self.tree.insert(rel, Generator::File(g));
    }

    /// Register a dir generator at `rel`.
    pub fn dir_generator(&mut self, rel: &str, g: Arc<dyn DirGenerator>) {
        self.tree.insert(rel, Generator::Dir(g));
    }

    /// Register a file server closure at `rel`: it answers for every path
    /// under that prefix, with `relative` computed per request.
    pub fn serve_file<F, Fut>(&mut self, rel: &str, f: F)
    where
        F: Fn(ScopedFs, File) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<File>> + Send + 'static,
    {
        self.tree.insert(rel, Generator::Serve(Arc::new(FileFn::new(f))));
    }

    /// Mount a sub-filesystem at this directory. The mount takes priority
    /// over generators registered inside this subtree.
    pub fn mount(&mut self, fs: impl Fs + 'static) {
        self.mount_arc(Arc::new(fs));
    }

    /// Mount an already-shared sub-filesystem at this directory.
    pub fn mount_arc(&mut self, fs: Arc<dyn Fs>) {
        self.mount = Some(fs);
    }

    pub(crate) fn tree(&self) -> &Tree {
        &self.tree
    }

    pub(crate) fn mount_fs(&self) -> Option<Arc<dyn Fs>> {
        self.mount.clone()
    }
}

/// Outcome of routing a path through the generator tree.
pub(crate) enum Resolved {
    File(Arc<File>),
    Dir(DirChildren),
    /// Delegate the operation to a mounted filesystem, re-rooted.
    Mounted { fs: Arc<dyn Fs>, rel: String },
}

/// A resolved directory whose listing is computed lazily: enumerating runs
/// child file generators (through the cache) for their metadata, while a
/// plain `stat` never does.
pub(crate) struct DirChildren {
    pub(crate) path: String,
    /// False for a file-server prefix, which cannot be listed.
    pub(crate) listable: bool,
    layers: Vec<Node>,
    mount: Option<Arc<dyn Fs>>,
}

impl DirChildren {
    /// Union of child entries across the mount and every layer, sorted by
    /// name. Higher-priority sources win name collisions. A file-generator
    /// child that fails with NotFound is omitted.
    pub(crate) async fn list(&self, shared: &Arc<Shared>, ctx: &Ctx) -> io::Result<Vec<DirEntry>> {
        if !self.listable {
            return Err(invalid_argument());
        }
        let mut out: BTreeMap<String, DirEntry> = BTreeMap::new();
        if let Some(m) = &self.mount {
            match m.read_dir(".").await {
                Ok(entries) => {
                    for e in entries {
                        out.entry(e.name.clone()).or_insert(e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        for layer in &self.layers {
            for (name, node) in &layer.children {
                if out.contains_key(name) {
                    continue;
                }
                let entry = match &node.generator {
                    Some(Generator::File(g)) => {
                        let child = path::join(&self.path, name);
                        match run_file(shared, ctx, &child, &child, &child, g.clone()).await {
                            Ok(f) => f.entry(),
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(e),
                        }
                    }
                    _ => DirEntry::directory(name.clone()),
                };
                out.insert(name.clone(), entry);
            }
        }
        Ok(out.into_values().collect())
    }
}

/// Route `name` to its generator.
///
/// Walks the radix segment by segment, carrying a priority-ordered set of
/// node layers: the output of the nearest enclosing dir generator first,
/// then statically registered nodes. The first layer with a generator at
/// the current level decides; a dir generator's mount shadows everything
/// below it.
pub(crate) async fn resolve(shared: &Arc<Shared>, ctx: &Ctx, name: &str) -> io::Result<Resolved> {
    let root = shared.tree.read().unwrap().root.clone();
    let segs = path::segments(name);
    let mut layers: Vec<Node> = vec![root];
    let mut idx = 0usize;

    loop {
        let cur = if idx == 0 {
            ".".to_string()
        } else {
            segs[..idx].join("/")
        };
        let generator = layers.iter().find_map(|n| n.generator.clone());

        match generator {
            Some(Generator::File(g)) => {
                return if idx == segs.len() {
                    let file = run_file(shared, ctx, &cur, &cur, &cur, g).await?;
                    Ok(Resolved::File(file))
                } else {
                    // Files have no children.
                    Err(not_found())
                };
            }
            Some(Generator::Serve(g)) => {
                if idx == segs.len() {
                    // The server prefix itself stats as a directory but
                    // cannot be listed.
                    return Ok(Resolved::Dir(DirChildren {
                        path: cur,
                        listable: false,
                        layers: Vec::new(),
                        mount: None,
                    }));
                }
                let file = run_file(shared, ctx, name, name, &cur, g).await?;
                return Ok(Resolved::File(file));
            }
            Some(Generator::Mount(fs)) => {
                let rel = if idx == segs.len() {
                    ".".to_string()
                } else {
                    segs[idx..].join("/")
                };
                return Ok(Resolved::Mounted { fs, rel });
            }
            Some(Generator::Dir(g)) => {
                let dir = run_dir(shared, ctx, &cur, name, g).await?;
                let produced = dir.tree().root.clone();
                if idx == segs.len() {
                    let mut all = vec![produced];
                    all.extend(layers.iter().cloned());
                    return Ok(Resolved::Dir(DirChildren {
                        path: cur,
                        listable: true,
                        layers: all,
                        mount: dir.mount_fs(),
                    }));
                }
                if let Some(m) = dir.mount_fs() {
                    let rel = segs[idx..].join("/");
                    match m.stat(&rel).await {
                        Ok(_) => return Ok(Resolved::Mounted { fs: m, rel }),
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e),
                    }
                }
                let seg = segs[idx];
                let mut next = Vec::new();
                if let Some(n) = produced.children.get(seg) {
                    next.push(n.clone());
                }
                for layer in &layers {
                    if let Some(n) = layer.children.get(seg) {
                        next.push(n.clone());
                    }
                }
                if next.is_empty() {
                    return Err(not_found());
                }
                layers = next;
                idx += 1;
            }
            None => {
                if idx == segs.len() {
                    // No generator owns this path, but registrations exist
                    // beneath it: synthesize the directory.
                    return Ok(Resolved::Dir(DirChildren {
                        path: cur,
                        listable: true,
                        layers,
                        mount: None,
                    }));
                }
                let seg = segs[idx];
                let mut next = Vec::new();
                for layer in &layers {
                    if let Some(n) = layer.children.get(seg) {
                        next.push(n.clone());
                    }
                }
                if next.is_empty() {
                    return Err(not_found());
                }
                layers = next;
                idx += 1;
            }
        }
    }
}

/// Run a file generator through the generator cache. At most one run per
/// key is in flight; concurrent requesters wait and observe the cached
/// result. A generator transitively reading its own output gets NotFound.
pub(crate) async fn run_file(
    shared: &Arc<Shared>,
    ctx: &Ctx,
    key: &str,
    target: &str,
    gen_path: &str,
    g: Arc<dyn FileGenerator>,
) -> io::Result<Arc<File>> {
    if ctx.in_chain(key) {
        return Err(not_found());
    }
    if let Some(GenValue::File(f)) = shared.gen_cache.get(key) {
        return Ok(f);
    }
    let lock = shared.gen_cache.key_lock(key);
    let _guard = lock.lock().await;
    if let Some(GenValue::File(f)) = shared.gen_cache.get(key) {
        return Ok(f);
    }

    let epoch = shared.gen_cache.epoch();
    let deps = Arc::new(StdMutex::new(HashSet::new()));
    let scoped = ScopedFs::new(shared.clone(), ctx.child(key, deps.clone()));
    debug!(path = key, "running file generator");
    let file = g.generate_file(scoped, File::new(target, gen_path)).await?;
    let file = Arc::new(file);
    let deps = deps.lock().unwrap().clone();
    shared
        .gen_cache
        .insert_at(epoch, key, GenValue::File(file.clone()), deps);
    Ok(file)
}

/// Run a dir generator through the generator cache. The cache key is the
/// generator's registered path, so one run serves the listing and every
/// child resolution beneath it.
pub(crate) async fn run_dir(
    shared: &Arc<Shared>,
    ctx: &Ctx,
    key: &str,
    target: &str,
    g: Arc<dyn DirGenerator>,
) -> io::Result<Arc<Dir>> {
    if ctx.in_chain(key) {
        return Err(not_found());
    }
    if let Some(GenValue::Dir(d)) = shared.gen_cache.get(key) {
        return Ok(d);
    }
    let lock = shared.gen_cache.key_lock(key);
    let _guard = lock.lock().await;
    if let Some(GenValue::Dir(d)) = shared.gen_cache.get(key) {
        return Ok(d);
    }

    let epoch = shared.gen_cache.epoch();
    let deps = Arc::new(StdMutex::new(HashSet::new()));
    let scoped = ScopedFs::new(shared.clone(), ctx.child(key, deps.clone()));
    debug!(path = key, "running dir generator");
    let dir = g.generate_dir(scoped, Dir::new(target, key)).await?;
    let dir = Arc::new(dir);
    let deps = deps.lock().unwrap().clone();
    shared
        .gen_cache
        .insert_at(epoch, key, GenValue::Dir(dir.clone()), deps);
    Ok(dir)
}
