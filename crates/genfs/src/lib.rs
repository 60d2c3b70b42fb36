//! genfs: a generator-backed virtual filesystem for build tooling.
//!
//! Callers register *generators* — producers of files, directories, served
//! prefixes, and mounted subtrees — and consumers read the combined tree
//! through one hierarchical read-only interface. The tree transparently
//! overlays generator output on a base filesystem, memoizes generator work
//! across reads, and evicts cached entries precisely in response to
//! explicit change notifications.
//!
//! This crate provides:
//!
//! - **GenFs**: the session facade (read, stat, read_dir, glob, sub,
//!   change, defer, close, sync)
//! - **Generators**: [`FileGenerator`] / [`DirGenerator`] traits, closure
//!   registration, and the declarative [`EmbedFile`]
//! - **ScopedFs**: the filesystem view a generator runs against; its reads
//!   become the generated entry's dependencies
//! - **Fs / WritableFs**: the boundary traits for base filesystems and
//!   sync sinks, with [`MemoryFs`] and [`LocalFs`] implementations
//!
//! # Example
//!
//! ```ignore
//! let gfs = GenFs::new(MemoryFs::new());
//! gfs.generate_file("a.txt", |_fs, mut file| async move {
//!     file.data = b"a".to_vec();
//!     Ok(file)
//! });
//! assert_eq!(gfs.read("a.txt").await?, b"a");
//! ```

mod cache;
mod fs;
mod generator;
#[allow(clippy::module_inception)]
mod genfs;
mod glob;
mod local;
mod memory;
mod merge;
mod node;
mod path;
mod scoped;
mod sync;
mod tree;

pub use fs::{Fs, WritableFs};
pub use generator::{DirGenerator, EmbedFile, FileGenerator};
pub use genfs::{GenFs, SubFs};
pub use local::LocalFs;
pub use memory::MemoryFs;
pub use node::{DIR_MODE, DirEntry, EntryKind, File};
pub use scoped::ScopedFs;
pub use tree::Dir;
