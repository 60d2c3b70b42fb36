//! Path model: forward-slash relative strings.
//!
//! Every path in the virtual filesystem is a relative, `/`-separated string.
//! `.` names the root. There is no leading or trailing slash, no `..`, no
//! empty segment, and no backslash. Helpers here are the single source of
//! truth for splitting, joining, and walking that grammar.

/// Check that `name` is a valid virtual path.
///
/// `.` alone is valid (the root). Otherwise every `/`-separated segment must
/// be non-empty and must not be `.` or `..`. Backslashes are rejected
/// outright; this filesystem has exactly one separator.
pub(crate) fn valid(name: &str) -> bool {
    if name == "." {
        return true;
    }
    if name.is_empty() || name.contains('\\') {
        return false;
    }
    name.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

/// Split a path into segments. The root `.` has no segments.
pub(crate) fn segments(name: &str) -> Vec<&str> {
    if name == "." {
        return Vec::new();
    }
    name.split('/').collect()
}

/// Join two paths. Either side may be `.`.
pub(crate) fn join(base: &str, rel: &str) -> String {
    if base == "." {
        return rel.to_string();
    }
    if rel == "." {
        return base.to_string();
    }
    format!("{base}/{rel}")
}

/// The final segment of a path. `base(".")` is `.`.
pub(crate) fn base(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// The parent directory of a path, or `None` for the root.
pub(crate) fn parent(name: &str) -> Option<&str> {
    if name == "." {
        return None;
    }
    match name.rfind('/') {
        Some(idx) => Some(&name[..idx]),
        None => Some("."),
    }
}

/// Strip `prefix` from `target`, yielding the path relative to the prefix.
/// Returns `.` when they are equal and `None` when `target` is not under
/// `prefix`.
pub(crate) fn relative_to<'a>(prefix: &str, target: &'a str) -> Option<&'a str> {
    if prefix == "." {
        return Some(target);
    }
    if target == prefix {
        return Some(".");
    }
    target
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(".", true)]
    #[case("a.txt", true)]
    #[case("bud/view/index.svelte", true)]
    #[case("go.mod", true)]
    #[case("", false)]
    #[case("/a.txt", false)]
    #[case("a.txt/", false)]
    #[case("a//b", false)]
    #[case("../a", false)]
    #[case("a/../b", false)]
    #[case("bud/view/.", false)]
    #[case("./a", false)]
    #[case("bud\\view", false)]
    fn test_valid(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(valid(name), expected, "{name:?}");
    }

    #[test]
    fn test_segments() {
        assert!(segments(".").is_empty());
        assert_eq!(segments("a/b/c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_join() {
        assert_eq!(join(".", "a"), "a");
        assert_eq!(join("a", "."), "a");
        assert_eq!(join("a", "b/c"), "a/b/c");
        assert_eq!(join(".", "."), ".");
    }

    #[test]
    fn test_base_and_parent() {
        assert_eq!(base("."), ".");
        assert_eq!(base("a/b/c.txt"), "c.txt");
        assert_eq!(parent("."), None);
        assert_eq!(parent("a"), Some("."));
        assert_eq!(parent("a/b/c"), Some("a/b"));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to(".", "a/b"), Some("a/b"));
        assert_eq!(relative_to("a", "a"), Some("."));
        assert_eq!(relative_to("a", "a/b/c"), Some("b/c"));
        assert_eq!(relative_to("a", "ab/c"), None);
        assert_eq!(relative_to("a/b", "a"), None);
    }
}
