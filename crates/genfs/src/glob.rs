//! Glob over the merged tree.
//!
//! Walks the union of generators and base filesystem from the root and
//! matches full paths against a shell-style pattern (`*`, `?`, `[...]`,
//! `{a,b}`, and `**` across separators). Entries whose name begins with
//! `.` or `_` are neither traversed nor matched. File-server prefixes
//! cannot be enumerated and are skipped.

use std::io;
use std::sync::Arc;

use genfs_glob::Pattern;

use crate::genfs::Shared;
use crate::merge;
use crate::path;
use crate::scoped::Ctx;

pub(crate) async fn glob(
    shared: &Arc<Shared>,
    ctx: &Ctx,
    pattern: &str,
) -> io::Result<Vec<String>> {
    let pattern = Pattern::new(pattern)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut results = Vec::new();
    let mut stack = vec![".".to_string()];
    while let Some(dir) = stack.pop() {
        let entries = match merge::read_dir(shared, ctx, &dir).await {
            Ok(entries) => entries,
            // File servers cannot be listed; vanished dirs match nothing.
            Err(e)
                if e.kind() == io::ErrorKind::InvalidInput
                    || e.kind() == io::ErrorKind::NotFound =>
            {
                continue;
            }
            Err(e) => return Err(e),
        };
        for entry in entries {
            if entry.name.starts_with('.') || entry.name.starts_with('_') {
                continue;
            }
            let full = path::join(&dir, &entry.name);
            if pattern.matches(&full) {
                results.push(full.clone());
            }
            if entry.is_dir() {
                stack.push(full);
            }
        }
    }
    results.sort();
    Ok(results)
}
