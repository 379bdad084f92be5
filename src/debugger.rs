use crate::elevation::env_truthy;

/// When set truthy, the stub blocks at startup until a debugger attaches.
pub const WAIT_DEBUGGER_ENV: &str = "SNAPX_WAIT_DEBUGGER";

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

/// Honor `SNAPX_WAIT_DEBUGGER` before any real work happens.
pub fn wait_if_requested() {
    if !env_truthy(WAIT_DEBUGGER_ENV) {
        return;
    }
    eprintln!(
        "[corerun] {WAIT_DEBUGGER_ENV} set, pid {} waiting for a debugger",
        std::process::id()
    );
    while !debugger_attached() {
        std::thread::sleep(POLL_INTERVAL);
    }
    eprintln!("[corerun] debugger attached, continuing");
}

/// Linux exposes the tracer through procfs.
#[cfg(target_os = "linux")]
fn debugger_attached() -> bool {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return true;
    };
    status
        .lines()
        .find_map(|l| l.strip_prefix("TracerPid:"))
        .and_then(|v| v.trim().parse::<u32>().ok())
        .is_some_and(|tracer| tracer != 0)
}

#[cfg(windows)]
fn debugger_attached() -> bool {
    use windows_sys::Win32::System::Diagnostics::Debug::IsDebuggerPresent;
    unsafe { IsDebuggerPresent() != 0 }
}

/// No portable tracer probe on the remaining hosts; do not block forever.
#[cfg(not(any(target_os = "linux", windows)))]
fn debugger_attached() -> bool {
    true
}
