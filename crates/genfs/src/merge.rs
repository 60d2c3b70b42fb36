//! Merge overlay: the generator tree unified with the base filesystem.
//!
//! Every operation asks the generator tree first; NotFound falls through
//! to the base, any other error surfaces immediately. Directory listings
//! union both sides, with the generator side winning name collisions.
//! Base-filesystem entries are materialized through the read cache, so one
//! underlying access serves stat, read, and listing within a pass.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::Arc;

use crate::fs::{not_found, wrap};
use crate::genfs::Shared;
use crate::node::{DirEntry, File};
use crate::path;
use crate::scoped::Ctx;
use crate::tree::{self, Resolved};

/// A materialized base-filesystem entry. NotFound is cached too, so a miss
/// is not re-probed within a pass.
#[derive(Clone)]
pub(crate) enum ReadValue {
    File(Arc<File>),
    Dir {
        meta: DirEntry,
        entries: Arc<Vec<DirEntry>>,
    },
    NotFound,
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "operation cancelled")
}

/// Read a file's bytes.
pub(crate) async fn read(shared: &Arc<Shared>, ctx: &Ctx, name: &str) -> io::Result<Vec<u8>> {
    read_inner(shared, ctx, name)
        .await
        .map_err(|e| wrap("mergefs", "open", name, e))
}

async fn read_inner(shared: &Arc<Shared>, ctx: &Ctx, name: &str) -> io::Result<Vec<u8>> {
    if shared.cancel.is_cancelled() {
        return Err(cancelled());
    }
    ctx.record(name);
    let gen_err = match tree::resolve(shared, ctx, name).await {
        Ok(Resolved::File(f)) => return Ok(f.data.clone()),
        Ok(Resolved::Dir(children)) => {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", children.path),
            ));
        }
        Ok(Resolved::Mounted { fs, rel }) => match fs.read(&rel).await {
            Ok(data) => return Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => e,
            Err(e) => return Err(e),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => e,
        Err(e) => return Err(e),
    };
    match base_entry(shared, name).await? {
        ReadValue::File(f) => Ok(f.data.clone()),
        ReadValue::Dir { meta, .. } => Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            format!("is a directory: {}", meta.name),
        )),
        ReadValue::NotFound => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{gen_err}. {}", not_found()),
        )),
    }
}

/// Stat a path.
pub(crate) async fn stat(shared: &Arc<Shared>, ctx: &Ctx, name: &str) -> io::Result<DirEntry> {
    stat_inner(shared, ctx, name)
        .await
        .map_err(|e| wrap("mergefs", "open", name, e))
}

async fn stat_inner(shared: &Arc<Shared>, ctx: &Ctx, name: &str) -> io::Result<DirEntry> {
    if shared.cancel.is_cancelled() {
        return Err(cancelled());
    }
    ctx.record(name);
    let gen_err = match tree::resolve(shared, ctx, name).await {
        Ok(Resolved::File(f)) => return Ok(f.entry()),
        Ok(Resolved::Dir(children)) => {
            return Ok(DirEntry::directory(path::base(&children.path)));
        }
        Ok(Resolved::Mounted { fs, rel }) => match fs.stat(&rel).await {
            Ok(mut entry) => {
                if rel == "." {
                    entry.name = path::base(name).to_string();
                }
                return Ok(entry);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => e,
            Err(e) => return Err(e),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => e,
        Err(e) => return Err(e),
    };
    match base_entry(shared, name).await? {
        ReadValue::File(f) => Ok(f.entry()),
        ReadValue::Dir { meta, .. } => Ok(meta),
        ReadValue::NotFound => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{gen_err}. {}", not_found()),
        )),
    }
}

/// List a directory: the sorted union of generator and base children.
pub(crate) async fn read_dir(
    shared: &Arc<Shared>,
    ctx: &Ctx,
    name: &str,
) -> io::Result<Vec<DirEntry>> {
    read_dir_inner(shared, ctx, name)
        .await
        .map_err(|e| wrap("mergefs", "open", name, e))
}

async fn read_dir_inner(
    shared: &Arc<Shared>,
    ctx: &Ctx,
    name: &str,
) -> io::Result<Vec<DirEntry>> {
    if shared.cancel.is_cancelled() {
        return Err(cancelled());
    }
    ctx.record(name);
    let gen_entries = match tree::resolve(shared, ctx, name).await {
        Ok(Resolved::Dir(children)) => Some(children.list(shared, ctx).await?),
        Ok(Resolved::File(f)) => {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", f.target()),
            ));
        }
        Ok(Resolved::Mounted { fs, rel }) => match fs.read_dir(&rel).await {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let base_entries = match base_entry(shared, name).await? {
        ReadValue::Dir { entries, .. } => Some(entries),
        ReadValue::File(_) => {
            if gen_entries.is_none() {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {name}"),
                ));
            }
            None
        }
        ReadValue::NotFound => None,
    };

    match (gen_entries, base_entries) {
        (None, None) => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}. {}", not_found(), not_found()),
        )),
        (gen_entries, base) => {
            let mut out: BTreeMap<String, DirEntry> = BTreeMap::new();
            for e in gen_entries.into_iter().flatten() {
                out.entry(e.name.clone()).or_insert(e);
            }
            for e in base.iter().flat_map(|v| v.iter()) {
                out.entry(e.name.clone()).or_insert_with(|| e.clone());
            }
            Ok(out.into_values().collect())
        }
    }
}

/// Materialize a base-filesystem entry through the read cache. One
/// underlying stat (plus read or listing) per path per pass; misses are
/// cached as NotFound sentinels.
pub(crate) async fn base_entry(shared: &Arc<Shared>, name: &str) -> io::Result<ReadValue> {
    if let Some(v) = shared.read_cache.get(name) {
        return Ok(v);
    }
    let lock = shared.read_cache.key_lock(name);
    let _guard = lock.lock().await;
    if let Some(v) = shared.read_cache.get(name) {
        return Ok(v);
    }

    let epoch = shared.read_cache.epoch();
    let value = match shared.base.stat(name).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => ReadValue::NotFound,
        Err(e) => return Err(e),
        Ok(meta) if meta.is_dir() => {
            let entries = shared.base.read_dir(name).await?;
            ReadValue::Dir {
                meta,
                entries: Arc::new(entries),
            }
        }
        Ok(meta) => {
            let data = shared.base.read(name).await?;
            let mut file = File::new(name, name);
            file.data = data;
            file.mode = meta.mode;
            file.modified = meta.modified;
            ReadValue::File(Arc::new(file))
        }
    };
    shared
        .read_cache
        .insert_at(epoch, name, value.clone(), HashSet::new());
    Ok(value)
}
