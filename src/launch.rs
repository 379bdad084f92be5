use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use semver::Version;
use thiserror::Error;

use crate::paths::{self, PathError};
use crate::process::{self, LaunchRequest, ProcessError};
use crate::scan::{self, EntryKind, ScanError};
use crate::version;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no versioned application directory under {0}")]
    NoVersionedApp(PathBuf),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// An `app-<semver>` child of the install root, as found on disk.
#[derive(Debug, Clone)]
pub struct VersionedAppDir {
    pub path: PathBuf,
    pub version: Version,
}

/// Scan the install root and pick the `app-<semver>` child with the
/// highest semver precedence. Children whose basename has the wrong
/// prefix or an unparseable remainder are skipped, never fatal.
pub fn select_newest(install_root: &Path) -> Result<VersionedAppDir, LaunchError> {
    let candidates = scan::list(install_root, EntryKind::Directories)?;
    let mut best: Option<VersionedAppDir> = None;
    for path in candidates {
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };
        let Some(version) = version::from_app_dir(name) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some(current) => version.cmp_precedence(&current.version) == Ordering::Greater,
        };
        if better {
            best = Some(VersionedAppDir { path, version });
        }
    }
    best.ok_or_else(|| LaunchError::NoVersionedApp(install_root.to_path_buf()))
}

/// Build the launch request for the newest installed version:
/// target `<chosen>/<own_name>`, cwd `<chosen>`, argv `[target] ++ onward`.
pub fn plan(
    install_root: &Path,
    own_name: &OsStr,
    onward_args: &[String],
    env_extra: Vec<(String, String)>,
    show_hint: i32,
) -> Result<LaunchRequest, LaunchError> {
    let chosen = select_newest(install_root)?;
    let target = paths::join(&chosen.path, Path::new(own_name))?;
    let mut argv = Vec::with_capacity(onward_args.len() + 1);
    argv.push(target.display().to_string());
    argv.extend(onward_args.iter().cloned());
    Ok(LaunchRequest {
        target,
        cwd: chosen.path,
        argv,
        env_extra,
        show_hint,
    })
}

/// The whole stub flow: resolve our own name and directory, pick the
/// newest version, daemonize it. Returns the process exit code.
pub fn run(onward_args: &[String], env_extra: Vec<(String, String)>, show_hint: i32) -> i32 {
    match run_inner(onward_args, env_extra, show_hint) {
        Ok(pid) => {
            eprintln!("[corerun] launched pid {pid}");
            0
        }
        Err(e) => {
            eprintln!("[corerun] launch failed: {e:#}");
            1
        }
    }
}

fn run_inner(
    onward_args: &[String],
    env_extra: Vec<(String, String)>,
    show_hint: i32,
) -> anyhow::Result<u32> {
    let own_exe = std::env::current_exe().context("cannot resolve the running executable")?;
    // resolve symlinks so the install root is the real on-disk directory
    let own_exe = std::fs::canonicalize(&own_exe).unwrap_or(own_exe);
    let own_name =
        paths::basename(&own_exe).context("the running executable has no name segment")?;
    let install_root =
        paths::dirname(&own_exe).context("the running executable has no parent directory")?;
    let request = plan(&install_root, &own_name, onward_args, env_extra, show_hint)?;
    Ok(process::daemonize(&request)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn install(root: &Path, dir_name: &str, own_name: &str) {
        let app = root.join(dir_name);
        std::fs::create_dir(&app).unwrap();
        std::fs::write(app.join(own_name), b"#!/bin/sh\n").unwrap();
    }

    #[test]
    fn empty_root_has_no_versioned_app() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            select_newest(dir.path()),
            Err(LaunchError::NoVersionedApp(_))
        ));
    }

    #[test]
    fn single_version_is_selected() {
        let dir = tempdir().unwrap();
        install(dir.path(), "app-1.0.0", "demo");
        let chosen = select_newest(dir.path()).unwrap();
        assert_eq!(chosen.path, dir.path().join("app-1.0.0"));
        assert_eq!(chosen.version, version::parse("1.0.0").unwrap());
    }

    #[test]
    fn highest_version_wins() {
        let dir = tempdir().unwrap();
        for v in ["app-1.0.0", "app-2.0.0", "app-4.0.0"] {
            install(dir.path(), v, "demo");
        }
        let chosen = select_newest(dir.path()).unwrap();
        assert!(chosen.path.ends_with("app-4.0.0"));
    }

    #[test]
    fn foreign_and_unparseable_names_are_skipped() {
        let dir = tempdir().unwrap();
        for v in ["notanapp-3.0.0", "app-2.0.0", "app-3.0...0", "app-4.0.0"] {
            install(dir.path(), v, "demo");
        }
        let chosen = select_newest(dir.path()).unwrap();
        assert!(chosen.path.ends_with("app-4.0.0"));
    }

    #[test]
    fn files_named_like_app_dirs_are_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("app-9.9.9"), b"not a dir").unwrap();
        install(dir.path(), "app-1.0.0", "demo");
        let chosen = select_newest(dir.path()).unwrap();
        assert!(chosen.path.ends_with("app-1.0.0"));
    }

    #[test]
    fn prerelease_loses_to_release_of_same_triple() {
        let dir = tempdir().unwrap();
        install(dir.path(), "app-2.0.0-rc.1", "demo");
        install(dir.path(), "app-2.0.0", "demo");
        let chosen = select_newest(dir.path()).unwrap();
        assert!(chosen.path.ends_with("app-2.0.0"));
    }

    #[test]
    fn randomized_insertion_order_still_picks_max() {
        let dir = tempdir().unwrap();
        // 0.0.0 .. 25.0.0 in a scrambled order
        let mut majors: Vec<u64> = (0..26).collect();
        let seed = std::process::id() as u64 | 1;
        majors.sort_by_key(|m| m.wrapping_mul(seed) % 26);
        for m in majors {
            install(dir.path(), &format!("app-{m}.0.0"), "demo");
        }
        let chosen = select_newest(dir.path()).unwrap();
        assert!(chosen.path.ends_with("app-25.0.0"));
    }

    #[test]
    fn plan_composes_target_cwd_and_argv() {
        let dir = tempdir().unwrap();
        install(dir.path(), "app-1.0.0", "demo");
        let onward = vec!["--flag=x".to_string()];
        let req = plan(dir.path(), OsStr::new("demo"), &onward, Vec::new(), 0).unwrap();

        let app = dir.path().join("app-1.0.0");
        assert_eq!(req.cwd, app);
        assert_eq!(req.target, app.join("demo"));
        assert_eq!(
            req.argv,
            vec![app.join("demo").display().to_string(), "--flag=x".to_string()]
        );
    }

    #[test]
    fn plan_preserves_onward_argument_order() {
        let dir = tempdir().unwrap();
        install(dir.path(), "app-1.0.0", "demo");
        let onward: Vec<String> = (0..32).map(|i| format!("arg-{i}")).collect();
        let req = plan(dir.path(), OsStr::new("demo"), &onward, Vec::new(), 0).unwrap();
        assert_eq!(&req.argv[1..], &onward[..]);
    }

    #[test]
    fn run_outside_an_install_tree_exits_one() {
        // the test binary's own directory holds no app-* entries, so the
        // whole flow fails cleanly through the error join
        assert_eq!(run(&[], Vec::new(), 0), 1);
    }

    #[test]
    fn plan_on_empty_root_fails_without_spawning() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            plan(dir.path(), OsStr::new("demo"), &[], Vec::new(), 0),
            Err(LaunchError::NoVersionedApp(_))
        ));
    }
}
