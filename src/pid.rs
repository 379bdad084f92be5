use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Probe interval for the wait loop. Portable cross-process wait does not
/// exist, so the watcher polls; anything tighter than this would burn CPU
/// for no latency the supervisor cares about.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Whether `pid` is a live process on this machine.
///
/// Unix: `kill(pid, 0)` probes existence without delivering a signal;
/// `EPERM` means the process exists but belongs to someone else, which
/// still counts as alive. Pid 0 addresses a process group and is never a
/// watchable process.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    let rc = unsafe { libc::kill(pid_i32, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
pub fn is_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    if pid == 0 {
        return false;
    }
    let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
    if handle.is_null() {
        return false;
    }
    let mut code: u32 = 0;
    let ok = unsafe { GetExitCodeProcess(handle, &mut code) };
    unsafe { CloseHandle(handle) };
    ok != 0 && code == STILL_ACTIVE as u32
}

/// Block until `pid` is no longer alive. Watching our own pid would never
/// return, so that case returns immediately. Best-effort only: a recycled
/// pid is indistinguishable from the original.
///
/// The supervisor uses the cancellable variant below; this one is kept
/// as public API for callers without a signal flag.
#[allow(dead_code)]
pub fn wait_for_exit(pid: u32) {
    let never = AtomicBool::new(false);
    wait_for_exit_or(pid, &never);
}

/// `wait_for_exit`, giving up early when `cancelled` becomes true between
/// probes. Returns true if the pid exited, false on cancellation.
pub fn wait_for_exit_or(pid: u32, cancelled: &AtomicBool) -> bool {
    if pid == std::process::id() {
        return true;
    }
    loop {
        if cancelled.load(Ordering::Relaxed) {
            return false;
        }
        if !is_alive(pid) {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
