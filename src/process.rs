use std::io;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

/// Default "show window" hint handed to a spawned child. Only Windows
/// interprets it (SW_SHOWDEFAULT); POSIX hosts ignore the field.
#[cfg(windows)]
pub const SHOW_DEFAULT: i32 = 10;
#[cfg(not(windows))]
pub const SHOW_DEFAULT: i32 = 0;

/// Upper bound on the input-idle wait after a detached spawn. Hitting the
/// bound is not a failure.
#[cfg(windows)]
const INPUT_IDLE_WAIT_MS: u32 = 5_000;

/// Longest executable path a Windows command line tolerates, in UTF-16
/// units. Longer paths are rejected up front instead of being truncated.
#[cfg(windows)]
const MAX_TARGET_UNITS: usize = 260;

/// Everything a spawn needs, fixed at construction time.
///
/// `argv[0]` is the target path itself; `env_extra` is merged over a
/// snapshot of the current environment.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub target: PathBuf,
    pub cwd: PathBuf,
    pub argv: Vec<String>,
    pub env_extra: Vec<(String, String)>,
    pub show_hint: i32,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("executable not found: {0}")]
    ExeMissing(PathBuf),
    #[error("working directory not found: {0}")]
    CwdMissing(PathBuf),
    #[error("spawn denied: {0}")]
    SpawnDenied(PathBuf),
    #[error("executable path too long for this host: {0}")]
    #[cfg_attr(not(windows), allow(dead_code))] // only Windows caps the length
    PathTooLong(PathBuf),
    #[error("spawn of {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Run the target, inheriting stdin/stdout/stderr, and block until it
/// exits. The child's exit code comes back verbatim; death by signal maps
/// to the negated signal number.
///
/// The stub flow always daemonizes; this is the synchronous counterpart,
/// kept as public API for embedders that need the child's exit code.
#[allow(dead_code)]
pub fn exec_and_wait(req: &LaunchRequest) -> Result<i32, ProcessError> {
    precheck(req)?;
    let status = command_for(req)
        .status()
        .map_err(|e| spawn_error(&req.target, e))?;
    Ok(exit_code_of(status))
}

/// Spawn the target detached and return its pid without waiting. The
/// caller may exit immediately afterwards; the child keeps running.
///
/// POSIX: fork + exec via `Command::spawn`, with `setsid()` in the child
/// branch so it leaves the stub's session and controlling terminal.
/// `show_hint` has no POSIX meaning and is ignored here.
#[cfg(unix)]
pub fn daemonize(req: &LaunchRequest) -> Result<u32, ProcessError> {
    use std::os::unix::process::CommandExt;

    precheck(req)?;
    let _ = req.show_hint; // no POSIX meaning
    let mut cmd = command_for(req);
    unsafe {
        cmd.pre_exec(|| {
            // EPERM here means we already lead a session; keep going
            libc::setsid();
            Ok(())
        });
    }
    let child = cmd.spawn().map_err(|e| spawn_error(&req.target, e))?;
    Ok(child.id())
}

/// Windows: a single `CreateProcessW`, passing `show_hint` through
/// `STARTUPINFOW.wShowWindow`. After the spawn the child is granted the
/// right to bring a window to the foreground, and we wait a bounded time
/// for it to reach input-idle; a timeout there is not a failure.
#[cfg(windows)]
pub fn daemonize(req: &LaunchRequest) -> Result<u32, ProcessError> {
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{
        CreateProcessW, CREATE_UNICODE_ENVIRONMENT, PROCESS_INFORMATION, STARTF_USESHOWWINDOW,
        STARTUPINFOW,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        AllowSetForegroundWindow, WaitForInputIdle,
    };

    precheck(req)?;

    let target_w: Vec<u16> = req
        .target
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let mut cmdline_w: Vec<u16> = build_command_line(&req.argv)
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let cwd_w: Vec<u16> = req
        .cwd
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let mut env_block = environment_block(&req.env_extra);

    let mut si: STARTUPINFOW = unsafe { std::mem::zeroed() };
    si.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
    si.dwFlags = STARTF_USESHOWWINDOW;
    si.wShowWindow = req.show_hint as u16;
    let mut pi: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

    let created = unsafe {
        CreateProcessW(
            target_w.as_ptr(),
            cmdline_w.as_mut_ptr(),
            std::ptr::null(),
            std::ptr::null(),
            0,
            CREATE_UNICODE_ENVIRONMENT,
            env_block.as_mut_ptr().cast(),
            cwd_w.as_ptr(),
            &si,
            &mut pi,
        )
    };
    if created == 0 {
        return Err(spawn_error(&req.target, io::Error::last_os_error()));
    }
    let pid = pi.dwProcessId;
    unsafe {
        AllowSetForegroundWindow(pid);
        WaitForInputIdle(pi.hProcess, INPUT_IDLE_WAIT_MS);
        CloseHandle(pi.hThread);
        CloseHandle(pi.hProcess);
    }
    Ok(pid)
}

fn command_for(req: &LaunchRequest) -> Command {
    let mut cmd = Command::new(&req.target);
    if req.argv.len() > 1 {
        cmd.args(&req.argv[1..]);
    }
    cmd.current_dir(&req.cwd);
    cmd.envs(req.env_extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd
}

fn precheck(req: &LaunchRequest) -> Result<(), ProcessError> {
    check_target_length(req)?;
    if !req.target.exists() {
        return Err(ProcessError::ExeMissing(req.target.clone()));
    }
    if !req.cwd.is_dir() {
        return Err(ProcessError::CwdMissing(req.cwd.clone()));
    }
    Ok(())
}

#[cfg(windows)]
fn check_target_length(req: &LaunchRequest) -> Result<(), ProcessError> {
    use std::os::windows::ffi::OsStrExt;
    if req.target.as_os_str().encode_wide().count() >= MAX_TARGET_UNITS {
        return Err(ProcessError::PathTooLong(req.target.clone()));
    }
    Ok(())
}

#[cfg(not(windows))]
fn check_target_length(_req: &LaunchRequest) -> Result<(), ProcessError> {
    Ok(())
}

fn spawn_error(target: &std::path::Path, e: io::Error) -> ProcessError {
    match e.kind() {
        io::ErrorKind::NotFound => ProcessError::ExeMissing(target.to_path_buf()),
        io::ErrorKind::PermissionDenied => ProcessError::SpawnDenied(target.to_path_buf()),
        _ => ProcessError::Io {
            path: target.to_path_buf(),
            source: e,
        },
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    // no exit code means signal death on Unix
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        return -status.signal().unwrap_or(1);
    }
    #[cfg(not(unix))]
    {
        -1
    }
}

/// Serialize argv into one command-line string per the documented
/// CommandLineToArgvW parsing rules: backslashes double before an escaped
/// quote, and only arguments containing whitespace or quotes get wrapped.
#[allow(dead_code)] // consumed by the Windows daemonize branch
fn build_command_line(argv: &[String]) -> String {
    argv.iter()
        .map(|a| quote_argument(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // 2n+1 backslashes before a literal quote
                out.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat('\\').take(backslashes));
                backslashes = 0;
                out.push(c);
            }
        }
    }
    // trailing backslashes double so the closing quote stays a delimiter
    out.extend(std::iter::repeat('\\').take(backslashes * 2));
    out.push('"');
    out
}

/// Inherited environment snapshot merged with the per-launch additions,
/// flattened into a `KEY=VALUE\0...\0` UTF-16 block.
#[cfg(windows)]
fn environment_block(extra: &[(String, String)]) -> Vec<u16> {
    use std::collections::BTreeMap;
    use std::os::windows::ffi::OsStrExt;

    let mut merged: BTreeMap<std::ffi::OsString, std::ffi::OsString> =
        std::env::vars_os().collect();
    for (k, v) in extra {
        merged.insert(k.into(), v.into());
    }
    let mut block: Vec<u16> = Vec::new();
    for (k, v) in merged {
        block.extend(k.encode_wide());
        block.push(u16::from(b'='));
        block.extend(v.encode_wide());
        block.push(0);
    }
    block.push(0);
    block
}
