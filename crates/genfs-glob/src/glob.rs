//! Glob pattern matching over slash-separated paths.
//!
//! Pattern syntax:
//! - `*` — any run of characters within one path segment
//! - `**` — any run of characters, crossing `/`
//! - `?` — exactly one character (never `/`)
//! - `[abc]`, `[a-z]` — one character from a set or range
//! - `[!abc]` / `[^abc]` — one character outside the set
//! - `{a,b}` — alternatives, expanded before matching

use std::cell::Cell;

use crate::PatternError;

/// Work budget for a single match. Star-heavy patterns backtrack
/// combinatorially, so every matcher invocation draws from this budget and
/// an exhausted budget reports "no match" instead of spinning.
const MAX_MATCH_CALLS: usize = 100_000;

/// A compiled glob pattern.
///
/// Brace groups are expanded at compile time; matching tries each expanded
/// alternative in order.
///
/// # Examples
/// ```
/// use genfs_glob::Pattern;
///
/// let pat = Pattern::new("src/**.rs").unwrap();
/// assert!(pat.matches("src/main.rs"));
/// assert!(pat.matches("src/vfs/router.rs"));
/// assert!(!pat.matches("docs/main.md"));
/// ```
#[derive(Debug, Clone)]
pub struct Pattern {
    alternatives: Vec<Vec<char>>,
}

impl Pattern {
    /// Compile a pattern, validating classes and brace groups.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        validate(pattern)?;
        let alternatives = expand_braces(pattern)
            .into_iter()
            .map(|p| p.chars().collect())
            .collect();
        Ok(Self { alternatives })
    }

    /// Match a path against the pattern. The whole path must match.
    pub fn matches(&self, path: &str) -> bool {
        let input: Vec<char> = path.chars().collect();
        let calls = Cell::new(0usize);
        self.alternatives
            .iter()
            .any(|pat| match_at(pat, 0, &input, 0, &calls))
    }
}

/// Check if a string contains glob metacharacters (`*`, `?`, `[`, `{`).
///
/// ```
/// use genfs_glob::contains_glob;
/// assert!(contains_glob("*.rs"));
/// assert!(contains_glob("src/[ab]*.txt"));
/// assert!(!contains_glob("src/main.rs"));
/// ```
pub fn contains_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[') || s.contains('{')
}

/// Match a path against a glob pattern.
///
/// Convenience wrapper around [`Pattern`]; an invalid pattern matches
/// nothing.
///
/// # Examples
/// ```
/// use genfs_glob::glob_match;
///
/// assert!(glob_match("*.rs", "main.rs"));
/// assert!(glob_match("test?", "test1"));
/// assert!(glob_match("[abc]", "b"));
/// assert!(glob_match("*.{rs,go}", "main.go"));
/// assert!(!glob_match("*.txt", "main.rs"));
/// assert!(!glob_match("*.rs", "src/main.rs"));
/// assert!(glob_match("**.rs", "src/main.rs"));
/// ```
pub fn glob_match(pattern: &str, input: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(pat) => pat.matches(input),
        Err(_) => false,
    }
}

/// Expand brace alternatives in a pattern.
///
/// `{a,b,c}` multiplies the pattern into one variant per alternative.
/// Nesting works by expanding the outermost group and recursing on each
/// variant.
///
/// # Examples
/// ```
/// use genfs_glob::expand_braces;
///
/// assert_eq!(expand_braces("simple"), vec!["simple"]);
/// assert_eq!(expand_braces("{a,b}"), vec!["a", "b"]);
/// ```
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some((open, close)) = outer_brace_span(pattern) else {
        return vec![pattern.to_string()];
    };
    let head = &pattern[..open];
    let tail = &pattern[close + 1..];
    let mut variants = Vec::new();
    for alt in split_alternatives(&pattern[open + 1..close]) {
        variants.extend(expand_braces(&format!("{head}{alt}{tail}")));
    }
    variants
}

/// Byte span `(open, close)` of the first outermost `{...}` group, if any.
/// Brace metacharacters are ASCII, so byte offsets are valid slice bounds.
fn outer_brace_span(pattern: &str) -> Option<(usize, usize)> {
    let mut open = None;
    let mut depth = 0u32;
    for (i, b) in pattern.bytes().enumerate() {
        match b {
            b'{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some((open?, i));
                }
            }
            _ => {}
        }
    }
    None
}

/// Split group content on commas, ignoring commas inside nested groups.
fn split_alternatives(content: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    for (i, b) in content.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&content[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&content[start..]);
    parts
}

fn validate(pattern: &str) -> Result<(), PatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut brace_depth = 0i32;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' => brace_depth += 1,
            '}' => brace_depth -= 1,
            '[' => {
                // Scan for the closing bracket; `]` right after `[` or the
                // negation marker is a literal member of the class.
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '!' || chars[j] == '^') {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(PatternError::UnclosedClass(pattern.to_string()));
                }
                i = j;
            }
            _ => {}
        }
        i += 1;
    }
    if brace_depth != 0 {
        return Err(PatternError::UnclosedBrace(pattern.to_string()));
    }
    Ok(())
}

/// Core matcher with bounded backtracking. Returns false when the work
/// budget is exceeded.
fn match_at(pat: &[char], p: usize, input: &[char], i: usize, calls: &Cell<usize>) -> bool {
    let n = calls.get();
    if n > MAX_MATCH_CALLS {
        return false;
    }
    calls.set(n + 1);

    if p >= pat.len() {
        return i >= input.len();
    }

    match pat[p] {
        '*' => {
            if p + 1 < pat.len() && pat[p + 1] == '*' {
                // Globstar: any run of `*` longer than one crosses separators.
                let mut np = p;
                while np < pat.len() && pat[np] == '*' {
                    np += 1;
                }
                let mut k = i;
                loop {
                    if match_at(pat, np, input, k, calls) {
                        return true;
                    }
                    if k >= input.len() {
                        return false;
                    }
                    k += 1;
                }
            }
            // Single star: stops at the next separator.
            let mut k = i;
            loop {
                if match_at(pat, p + 1, input, k, calls) {
                    return true;
                }
                if k >= input.len() || input[k] == '/' {
                    return false;
                }
                k += 1;
            }
        }
        '?' => {
            i < input.len() && input[i] != '/' && match_at(pat, p + 1, input, i + 1, calls)
        }
        '[' => {
            if i >= input.len() || input[i] == '/' {
                return false;
            }
            let (matched, next) = match_class(pat, p, input[i]);
            matched && match_at(pat, next, input, i + 1, calls)
        }
        c => i < input.len() && input[i] == c && match_at(pat, p + 1, input, i + 1, calls),
    }
}

/// Match a single character against the class starting at `pat[p]` (which is
/// `[`). Returns whether it matched and the index just past the closing `]`.
fn match_class(pat: &[char], p: usize, c: char) -> (bool, usize) {
    let mut j = p + 1;
    let negate = j < pat.len() && (pat[j] == '!' || pat[j] == '^');
    if negate {
        j += 1;
    }

    let mut matched = false;
    let mut first = true;
    while j < pat.len() && (pat[j] != ']' || first) {
        first = false;
        // Range like a-z (the `-` must not be the last class member)
        if j + 2 < pat.len() && pat[j + 1] == '-' && pat[j + 2] != ']' {
            if pat[j] <= c && c <= pat[j + 2] {
                matched = true;
            }
            j += 3;
        } else {
            if pat[j] == c {
                matched = true;
            }
            j += 1;
        }
    }
    // Skip the closing bracket; validation guarantees it exists.
    if j < pat.len() {
        j += 1;
    }
    (matched != negate, j)
}
