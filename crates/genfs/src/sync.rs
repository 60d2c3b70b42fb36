//! Sync engine: authoritative materialization of a virtual subtree.
//!
//! Walks the merged tree under a prefix, writing every file and directory
//! into the sink, then prunes sink entries the walk did not visit. The
//! generator cache is preserved across syncs; the read cache is reset by
//! the caller before the walk so base files are re-read once per pass.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Arc;

use tracing::debug;

use crate::fs::WritableFs;
use crate::genfs::Shared;
use crate::merge;
use crate::node::DIR_MODE;
use crate::path;
use crate::scoped::Ctx;

pub(crate) async fn sync(
    shared: &Arc<Shared>,
    sink: &dyn WritableFs,
    prefix: &str,
) -> io::Result<()> {
    let ctx = Ctx::default();
    let mut visited: HashSet<String> = HashSet::new();

    let root = merge::stat(shared, &ctx, prefix).await?;
    if root.is_file() {
        let data = merge::read(shared, &ctx, prefix).await?;
        sink.write_file(prefix, &data, root.mode).await?;
        return Ok(());
    }

    let mut queue = vec![prefix.to_string()];
    while let Some(dir) = queue.pop() {
        sink.mkdir_all(&dir, DIR_MODE).await?;
        visited.insert(dir.clone());
        let entries = match merge::read_dir(shared, &ctx, &dir).await {
            Ok(entries) => entries,
            // File servers have no finite listing; they are not synced.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let child = path::join(&dir, &entry.name);
            if entry.is_dir() {
                queue.push(child);
            } else {
                let data = merge::read(shared, &ctx, &child).await?;
                sink.write_file(&child, &data, entry.mode).await?;
                visited.insert(child);
            }
        }
    }

    prune(sink, prefix, &visited).await
}

/// Delete everything under `prefix` in the sink that the walk did not
/// visit. Children are removed before their parents.
async fn prune(sink: &dyn WritableFs, prefix: &str, visited: &HashSet<String>) -> io::Result<()> {
    let mut all: Vec<String> = Vec::new();
    let mut queue: VecDeque<String> = VecDeque::from([prefix.to_string()]);
    while let Some(dir) = queue.pop_front() {
        let entries = match sink.read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let child = path::join(&dir, &entry.name);
            if entry.is_dir() {
                queue.push_back(child.clone());
            }
            all.push(child);
        }
    }
    for p in all.iter().rev() {
        if !visited.contains(p) {
            debug!(path = %p, "pruning stale sink entry");
            sink.remove(p).await?;
        }
    }
    Ok(())
}
