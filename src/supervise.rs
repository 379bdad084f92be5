use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::launch;
use crate::lock::{LockError, MachineLock};
use crate::pid;

/// The machine-wide lock is keyed `corerun-<application id>` so distinct
/// applications never contend.
pub const LOCK_PREFIX: &str = "corerun-";

/// Application ids are restricted to a safe kernel-object alphabet and a
/// length that keeps the derived lock name under every host's limit.
pub const APP_ID_MAX_LEN: usize = 230;

static CANCELLED: AtomicBool = AtomicBool::new(false);
static SIGNO: AtomicI32 = AtomicI32::new(0);

/// `^[A-Za-z0-9_.-]{1,230}$`
pub fn validate_app_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= APP_ID_MAX_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

/// Supervise `watched_pid`: take the machine-wide lock for `app_id`, wait
/// for the pid to exit, release the lock, then run the stub flow with the
/// scrubbed argv. Returns the process exit code.
///
/// A termination signal between pid probes releases the lock and exits
/// with the signal's conventional code; the lock is always released
/// before this function returns.
pub fn run(
    watched_pid: u32,
    app_id: &str,
    onward_args: &[String],
    env_extra: Vec<(String, String)>,
    show_hint: i32,
) -> i32 {
    if !validate_app_id(app_id) {
        eprintln!("[corerun] invalid application id {app_id:?}");
        return 1;
    }
    if !pid::is_alive(watched_pid) {
        eprintln!("[corerun] pid {watched_pid} is not running, nothing to supervise");
        return 1;
    }

    // handlers go in before the lock exists: a signal landing between
    // acquisition and installation would otherwise kill the process with
    // the semaphore decremented and nobody left to post it
    install_termination_handlers();

    let lock_name = format!("{LOCK_PREFIX}{app_id}");
    let mut lock = match MachineLock::try_acquire(&lock_name) {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            eprintln!("[corerun] another supervisor already manages {app_id:?}");
            return 1;
        }
        Err(e @ LockError::NameTooLong(_)) => {
            eprintln!("[corerun] warning: {e}");
            return 1;
        }
        Err(e) => {
            eprintln!("[corerun] acquiring the supervisor lock failed: {e}");
            return 1;
        }
    };

    eprintln!("[corerun] supervising pid {watched_pid} for {app_id:?}");
    let exited = pid::wait_for_exit_or(watched_pid, &CANCELLED);
    lock.release();

    if !exited {
        let signo = SIGNO.load(Ordering::Relaxed);
        eprintln!("[corerun] terminated by signal {signo}, lock released");
        return 128 + signo;
    }

    launch::run(onward_args, env_extra, show_hint)
}

#[cfg(unix)]
extern "C" fn on_terminate(signo: libc::c_int) {
    // async-signal-safe: just record and let the wait loop observe it
    SIGNO.store(signo, Ordering::Relaxed);
    CANCELLED.store(true, Ordering::Relaxed);
}

#[cfg(unix)]
fn install_termination_handlers() {
    let handler = on_terminate as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

#[cfg(windows)]
fn install_termination_handlers() {
    use windows_sys::Win32::System::Console::SetConsoleCtrlHandler;

    unsafe extern "system" fn on_ctrl(_kind: u32) -> i32 {
        SIGNO.store(2, Ordering::Relaxed);
        CANCELLED.store(true, Ordering::Relaxed);
        1
    }
    unsafe {
        SetConsoleCtrlHandler(Some(on_ctrl), 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use std::sync::Mutex;

    // tests that raise signals or observe the cancellation flag share
    // process-global state and must not interleave
    #[cfg(unix)]
    static SIG_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn app_id_accepts_the_documented_alphabet() {
        assert!(validate_app_id("demo"));
        assert!(validate_app_id("My.App_1-beta"));
        assert!(validate_app_id(&"a".repeat(APP_ID_MAX_LEN)));
    }

    #[test]
    fn app_id_rejects_empty_oversized_and_foreign_chars() {
        assert!(!validate_app_id(""));
        assert!(!validate_app_id(&"a".repeat(APP_ID_MAX_LEN + 1)));
        assert!(!validate_app_id("has space"));
        assert!(!validate_app_id("slash/ed"));
        assert!(!validate_app_id("uni\u{e9}"));
    }

    #[test]
    fn invalid_app_id_exits_one() {
        assert_eq!(run(1, "bad id", &[], Vec::new(), 0), 1);
    }

    #[test]
    fn dead_pid_exits_one() {
        assert_eq!(run(4_000_000, "demo-dead-pid", &[], Vec::new(), 0), 1);
    }

    #[cfg(unix)]
    #[test]
    fn held_lock_turns_a_second_supervisor_away() {
        let app_id = format!("test-held-{}", std::process::id());
        let _held = MachineLock::try_acquire(&format!("{LOCK_PREFIX}{app_id}"))
            .unwrap()
            .expect("fresh name");

        let mut sleeper = std::process::Command::new("/bin/sh")
            .args(["-c", "sleep 30"])
            .spawn()
            .unwrap();
        let code = run(sleeper.id(), &app_id, &[], Vec::new(), 0);
        assert_eq!(code, 1);

        sleeper.kill().unwrap();
        sleeper.wait().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn supervisor_waits_then_releases_the_lock() {
        let _guard = SIG_LOCK.lock().unwrap();
        let app_id = format!("test-release-{}", std::process::id());
        let mut sleeper = std::process::Command::new("/bin/sh")
            .args(["-c", "sleep 0.4"])
            .spawn()
            .unwrap();
        let watched = sleeper.id();
        let reaper = std::thread::spawn(move || sleeper.wait());

        // the test binary's directory holds no app-* entries, so the
        // onward launch fails with code 1 — but only after the wait and
        // the release have both happened
        let code = run(watched, &app_id, &[], Vec::new(), 0);
        assert_eq!(code, 1);
        reaper.join().unwrap().unwrap();

        let reacquired = MachineLock::try_acquire(&format!("{LOCK_PREFIX}{app_id}")).unwrap();
        assert!(reacquired.is_some(), "lock must be free after supervision");
    }

    #[cfg(unix)]
    #[test]
    fn signal_before_the_wait_loop_still_releases_the_lock() {
        let _guard = SIG_LOCK.lock().unwrap();

        // handlers are live before acquisition, so a signal landing this
        // early is recorded rather than killing the process
        install_termination_handlers();
        unsafe {
            libc::raise(libc::SIGTERM);
        }
        assert!(CANCELLED.load(Ordering::Relaxed));
        assert_eq!(SIGNO.load(Ordering::Relaxed), libc::SIGTERM);

        let app_id = format!("test-signal-{}", std::process::id());
        let mut sleeper = std::process::Command::new("/bin/sh")
            .args(["-c", "sleep 30"])
            .spawn()
            .unwrap();

        // the pending cancellation short-circuits the wait and carries
        // the signal's conventional code out
        let code = run(sleeper.id(), &app_id, &[], Vec::new(), 0);
        assert_eq!(code, 128 + libc::SIGTERM);

        let reacquired = MachineLock::try_acquire(&format!("{LOCK_PREFIX}{app_id}")).unwrap();
        assert!(reacquired.is_some(), "lock must be free after cancellation");

        CANCELLED.store(false, Ordering::Relaxed);
        SIGNO.store(0, Ordering::Relaxed);
        sleeper.kill().unwrap();
        sleeper.wait().unwrap();
    }
}
