use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("path escapes its anchor: {0}")]
    Escape(String),
}

/// Combine `base` and `tail`, then normalize. An absolute `tail` replaces
/// `base` entirely (same rule as `PathBuf::join`).
pub fn join(base: &Path, tail: &Path) -> Result<PathBuf, PathError> {
    if tail.as_os_str().is_empty() {
        return normalize(base);
    }
    normalize(&base.join(tail))
}

/// Collapse `.` and `..` segments, redundant separators, and trailing
/// separators, without touching the filesystem.
///
/// `..` at the root of an absolute path is absorbed by the root. In a
/// relative path, a `..` that would pop the last remaining segment has
/// nothing left to anchor it and fails with `Escape` — so `"a/b/.."`
/// normalizes to `"a"` but `"abc/.."` and `"a/../a"` are both errors.
pub fn normalize(p: &Path) -> Result<PathBuf, PathError> {
    if p.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }
    let mut parts: Vec<Component> = Vec::new();
    let mut anchored = false;
    for comp in p.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => {
                anchored = true;
                parts.push(comp);
            }
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                    if parts.is_empty() && !anchored {
                        return Err(PathError::Escape(p.display().to_string()));
                    }
                }
                // `/..` stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => return Err(PathError::Escape(p.display().to_string())),
            },
            Component::Normal(_) => parts.push(comp),
        }
    }
    let out: PathBuf = parts.iter().map(|c| c.as_os_str()).collect();
    if out.as_os_str().is_empty() {
        // a relative path that collapsed to nothing, e.g. "." or "./."
        return Err(PathError::Empty);
    }
    Ok(out)
}

/// Last segment of the normalized path. Fails on an empty path and on a
/// bare root, which has no segment.
pub fn basename(p: &Path) -> Result<std::ffi::OsString, PathError> {
    let norm = normalize(p)?;
    norm.file_name()
        .map(OsStr::to_os_string)
        .ok_or(PathError::Empty)
}

/// Normalized path with its last segment removed. For a single-segment
/// absolute path this is the root itself; a single relative segment has
/// no parent and fails with `Empty`.
pub fn dirname(p: &Path) -> Result<PathBuf, PathError> {
    let norm = normalize(p)?;
    match norm.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        // the bare root has no parent; it is its own dirname
        _ if norm.has_root() => {
            let root = norm.ancestors().last().unwrap_or(norm.as_path());
            Ok(root.to_path_buf())
        }
        // a single relative segment has nothing above it
        _ => Err(PathError::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> Result<PathBuf, PathError> {
        normalize(Path::new(s))
    }

    fn joined(a: &str, b: &str) -> Result<PathBuf, PathError> {
        join(Path::new(a), Path::new(b))
    }

    #[test]
    fn join_simple_segments() {
        assert_eq!(joined("/a/b/c", "d").unwrap(), PathBuf::from("/a/b/c/d"));
    }

    #[test]
    fn join_parent_pops_one_segment() {
        assert_eq!(joined("a/b", "..").unwrap(), PathBuf::from("a"));
    }

    #[test]
    fn join_parent_escaping_relative_anchor_fails() {
        assert!(matches!(joined("a", "../a"), Err(PathError::Escape(_))));
    }

    #[test]
    fn join_absolute_tail_replaces_base() {
        assert_eq!(joined("/a/b", "/x/y").unwrap(), PathBuf::from("/x/y"));
    }

    #[test]
    fn normalize_drops_cur_dir() {
        assert_eq!(norm("/abc/./123").unwrap(), PathBuf::from("/abc/123"));
    }

    #[test]
    fn normalize_collapses_parent_dir() {
        assert_eq!(norm("/abc/../123").unwrap(), PathBuf::from("/123"));
    }

    #[test]
    fn normalize_relative_collapse_to_nothing_fails() {
        assert!(matches!(norm("abc/.."), Err(PathError::Escape(_))));
    }

    #[test]
    fn normalize_repeated_separators() {
        assert_eq!(norm("////").unwrap(), PathBuf::from("/"));
    }

    #[test]
    fn normalize_parent_at_root_is_absorbed() {
        assert_eq!(norm("/../a").unwrap(), PathBuf::from("/a"));
    }

    #[test]
    fn normalize_trailing_separator() {
        assert_eq!(norm("/a/b/").unwrap(), PathBuf::from("/a/b"));
    }

    #[test]
    fn normalize_empty_fails() {
        assert_eq!(norm(""), Err(PathError::Empty));
    }

    #[test]
    fn normalize_leading_parent_in_relative_fails() {
        assert!(matches!(norm("../a"), Err(PathError::Escape(_))));
    }

    #[test]
    fn normalize_is_idempotent() {
        for case in ["/a/b/c", "a/b", "/abc/./123", "////", "/x/../y/z/"] {
            if let Ok(once) = norm(case) {
                assert_eq!(normalize(&once).unwrap(), once, "case {case:?}");
            }
        }
    }

    #[test]
    fn join_then_normalize_is_stable() {
        let j = joined("/a//b/", "./c/../d").unwrap();
        assert_eq!(j, PathBuf::from("/a/b/d"));
        assert_eq!(normalize(&j).unwrap(), j);
    }

    #[test]
    fn basename_last_segment() {
        assert_eq!(basename(Path::new("/a/b/c")).unwrap(), "c");
        assert_eq!(basename(Path::new("a")).unwrap(), "a");
    }

    #[test]
    fn basename_empty_fails() {
        assert_eq!(basename(Path::new("")), Err(PathError::Empty));
    }

    #[test]
    fn dirname_single_segment_absolute_is_root() {
        assert_eq!(dirname(Path::new("/a")).unwrap(), PathBuf::from("/"));
    }

    #[test]
    fn dirname_strips_last_segment() {
        assert_eq!(dirname(Path::new("/a/b/c")).unwrap(), PathBuf::from("/a/b"));
        assert_eq!(dirname(Path::new("a/b")).unwrap(), PathBuf::from("a"));
    }

    #[test]
    fn dirname_single_relative_segment_has_no_parent() {
        assert_eq!(dirname(Path::new("a")), Err(PathError::Empty));
        assert_eq!(dirname(Path::new("./a")), Err(PathError::Empty));
    }
}
