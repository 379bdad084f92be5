use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("directory not found: {0}")]
    Missing(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("listing {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directories,
    Files,
}

/// List the immediate children of `dir` that are of the requested kind,
/// as absolute-as-given paths. `.` and `..` never appear. Symlinks are
/// classified by their final target with a single `metadata` call per
/// entry; broken links are skipped.
pub fn list(dir: &Path, kind: EntryKind) -> Result<Vec<PathBuf>, ScanError> {
    list_matching(dir, kind, |_| true)
}

/// `list`, keeping only entries whose file name ends with `suffix`.
///
/// Not yet called outside tests — kept as public API for install trees
/// that distinguish binaries by extension.
#[allow(dead_code)]
pub fn list_with_suffix(
    dir: &Path,
    kind: EntryKind,
    suffix: &str,
) -> Result<Vec<PathBuf>, ScanError> {
    list_matching(dir, kind, |p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix))
    })
}

/// `list` with an arbitrary keep-predicate over the candidate path.
pub fn list_matching<F>(dir: &Path, kind: EntryKind, keep: F) -> Result<Vec<PathBuf>, ScanError>
where
    F: Fn(&Path) -> bool,
{
    let entries = std::fs::read_dir(dir).map_err(|e| read_dir_error(dir, e))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| read_dir_error(dir, e))?;
        let path = entry.path();
        // follows a symlink to its final target; one stat, no recursion
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };
        let wanted = match kind {
            EntryKind::Directories => meta.is_dir(),
            EntryKind::Files => meta.is_file(),
        };
        if wanted && keep(&path) {
            out.push(path);
        }
    }
    Ok(out)
}

fn read_dir_error(dir: &Path, e: io::Error) -> ScanError {
    match e.kind() {
        io::ErrorKind::NotFound => ScanError::Missing(dir.to_path_buf()),
        io::ErrorKind::PermissionDenied => ScanError::PermissionDenied(dir.to_path_buf()),
        _ => ScanError::Io {
            path: dir.to_path_buf(),
            source: e,
        },
    }
}
