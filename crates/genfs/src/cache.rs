//! Dependency-tracked memoization.
//!
//! Two tiers of [`Cache`] coexist in a session:
//!
//! 1. The **generator cache** persists across reads and syncs and is only
//!    evicted by change flushes.
//! 2. The **read cache** holds base-filesystem materializations for a
//!    single sync pass and is reset wholesale at the start of each sync,
//!    so external files are re-read while generator output stays memoized.
//!
//! Every entry carries the set of paths its producer consulted. An inverse
//! index maps each dependency to its dependents; flushing a change walks
//! the inverse edges breadth-first and evicts the transitive closure.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

struct Entry<V> {
    value: V,
    deps: HashSet<String>,
}

struct State<V> {
    entries: HashMap<String, Entry<V>>,
    /// dep key -> entry keys that consulted it.
    inverse: HashMap<String, HashSet<String>>,
    /// Per-key execution locks: at most one producer per key in flight.
    locks: HashMap<String, Arc<AsyncMutex<()>>>,
}

impl<V> Default for State<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            inverse: HashMap::new(),
            locks: HashMap::new(),
        }
    }
}

/// One cache tier. `V` is cheap to clone (entries hold `Arc`s).
pub(crate) struct Cache<V> {
    state: StdMutex<State<V>>,
    /// Bumped on every eviction barrier (flush or reset). A producer run
    /// that straddles a barrier completes but must not populate the cache.
    epoch: AtomicU64,
}

impl<V: Clone> Cache<V> {
    pub(crate) fn new() -> Self {
        Self {
            state: StdMutex::new(State::default()),
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<V> {
        let state = self.state.lock().unwrap();
        state.entries.get(key).map(|e| e.value.clone())
    }

    /// The current barrier epoch. Capture before producing a value and pass
    /// it to [`Cache::insert_at`].
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// The per-key execution lock. Hold it while producing the value for
    /// `key` so concurrent requesters wait and observe the cached result.
    pub(crate) fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut state = self.state.lock().unwrap();
        state
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Store a value with its dependency edges, unless an eviction barrier
    /// has passed since `epoch` was captured.
    pub(crate) fn insert_at(&self, epoch: u64, key: &str, value: V, deps: HashSet<String>) {
        let mut state = self.state.lock().unwrap();
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!(key, "cache insert skipped: eviction barrier passed");
            return;
        }
        for dep in &deps {
            state
                .inverse
                .entry(dep.clone())
                .or_default()
                .insert(key.to_string());
        }
        state.entries.insert(key.to_string(), Entry { value, deps });
    }

    /// Remove the entries for `keys` plus everything transitively dependent
    /// on them.
    pub(crate) fn evict_closure(&self, keys: &[String]) {
        let mut state = self.state.lock().unwrap();
        let mut queue: VecDeque<String> = keys.iter().cloned().collect();
        let mut seen: HashSet<String> = keys.iter().cloned().collect();
        while let Some(key) = queue.pop_front() {
            if let Some(entry) = state.entries.remove(&key) {
                debug!(key, "evicting cache entry");
                for dep in entry.deps {
                    if let Some(dependents) = state.inverse.get_mut(&dep) {
                        dependents.remove(&key);
                    }
                }
            }
            if let Some(dependents) = state.inverse.get(&key) {
                for dependent in dependents.clone() {
                    if seen.insert(dependent.clone()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Remove only the entries for `keys` (no closure walk).
    pub(crate) fn remove(&self, keys: &[String]) {
        let mut state = self.state.lock().unwrap();
        let mut removed = false;
        for key in keys {
            if let Some(entry) = state.entries.remove(key) {
                removed = true;
                for dep in entry.deps {
                    if let Some(dependents) = state.inverse.get_mut(&dep) {
                        dependents.remove(key);
                    }
                }
            }
        }
        if removed {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Drop every entry. Used to reset the read cache between sync passes.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.inverse.clear();
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }
}
