//! genfs-glob: Shell-style glob matching for virtual filesystem paths.
//!
//! Provides:
//! - **Pattern**: a compiled glob pattern with `*`, `?`, `[...]` classes,
//!   `{a,b}` brace alternatives, and `**` spanning path separators
//! - **glob_match**: one-shot convenience matcher
//! - **contains_glob**: metacharacter detection for callers that switch
//!   between literal-path and pattern modes
//!
//! Paths are forward-slash separated. `*` and `?` never cross a `/`;
//! `**` does.

mod glob;

pub use glob::{Pattern, contains_glob, expand_braces, glob_match};

use thiserror::Error;

/// Errors from compiling a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unclosed character class in pattern: {0}")]
    UnclosedClass(String),
    #[error("unclosed brace group in pattern: {0}")]
    UnclosedBrace(String),
}
