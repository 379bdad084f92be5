use std::io;
use thiserror::Error;

/// Longest lock name the host accepts. Linux named semaphores live under
/// `/dev/shm/sem.<name>`, which caps the name (with its leading slash) at
/// NAME_MAX - 4 bytes; the Windows kernel-object limit is roomier but we
/// hold both hosts to the same bound.
pub const MAX_NAME_LEN: usize = 250;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock name is {0} bytes, host limit is {MAX_NAME_LEN}")]
    NameTooLong(usize),
    #[error("lock name contains an interior NUL")]
    InvalidName,
    #[error("lock syscall failed: {0}")]
    Io(#[from] io::Error),
}

/// Machine-wide mutual exclusion keyed by a name.
///
/// Backed by a kernel-owned primitive — a POSIX named semaphore on Unix
/// and a `Global\` named mutex on Windows — never by a lock file, so the
/// OS reclaims it when the owner dies without releasing.
///
/// `try_acquire` never blocks: `Ok(Some(...))` on ownership, `Ok(None)`
/// when another process holds the name. Dropping the token releases it;
/// an explicit `release` is idempotent.
#[derive(Debug)]
pub struct MachineLock {
    #[cfg(unix)]
    sem: *mut libc::sem_t,
    #[cfg(windows)]
    handle: isize,
    released: bool,
}

impl MachineLock {
    #[cfg(unix)]
    pub fn try_acquire(name: &str) -> Result<Option<Self>, LockError> {
        if name.len() + 1 > MAX_NAME_LEN {
            return Err(LockError::NameTooLong(name.len() + 1));
        }
        let c_name =
            std::ffi::CString::new(format!("/{name}")).map_err(|_| LockError::InvalidName)?;
        // value 1: one holder at a time, machine scope; 0666 so a
        // supervisor under any account can open a name another account
        // created
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o666 as libc::c_uint,
                1 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            let err = io::Error::last_os_error();
            // a pre-existing semaphore we may not open is still a held
            // name, not a failure
            return if contended(&err) {
                Ok(None)
            } else {
                Err(err.into())
            };
        }
        let rc = unsafe { libc::sem_trywait(sem) };
        if rc == 0 {
            return Ok(Some(MachineLock {
                sem,
                released: false,
            }));
        }
        let err = io::Error::last_os_error();
        unsafe { libc::sem_close(sem) };
        if contended(&err) {
            Ok(None)
        } else {
            Err(err.into())
        }
    }

    #[cfg(windows)]
    pub fn try_acquire(name: &str) -> Result<Option<Self>, LockError> {
        use windows_sys::Win32::Foundation::{
            CloseHandle, WAIT_ABANDONED, WAIT_OBJECT_0, WAIT_TIMEOUT,
        };
        use windows_sys::Win32::System::Threading::{CreateMutexW, WaitForSingleObject};

        // "Global\" scopes the mutex to the machine, not the login session
        let full = format!("Global\\{name}");
        if full.len() > MAX_NAME_LEN {
            return Err(LockError::NameTooLong(full.len()));
        }
        if full.contains('\0') {
            return Err(LockError::InvalidName);
        }
        let wide: Vec<u16> = full.encode_utf16().chain(std::iter::once(0)).collect();
        let handle = unsafe { CreateMutexW(std::ptr::null(), 0, wide.as_ptr()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error().into());
        }
        match unsafe { WaitForSingleObject(handle, 0) } {
            // WAIT_ABANDONED: the previous owner died; the kernel hands
            // the mutex to us
            WAIT_OBJECT_0 | WAIT_ABANDONED => Ok(Some(MachineLock {
                handle: handle as isize,
                released: false,
            })),
            WAIT_TIMEOUT => {
                unsafe { CloseHandle(handle) };
                Ok(None)
            }
            _ => {
                let err = io::Error::last_os_error();
                unsafe { CloseHandle(handle) };
                Err(err.into())
            }
        }
    }

    /// Give the name back. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        #[cfg(unix)]
        unsafe {
            libc::sem_post(self.sem);
            libc::sem_close(self.sem);
        }
        #[cfg(windows)]
        unsafe {
            use windows_sys::Win32::Foundation::CloseHandle;
            use windows_sys::Win32::System::Threading::ReleaseMutex;
            let handle = self.handle as *mut core::ffi::c_void;
            ReleaseMutex(handle);
            CloseHandle(handle);
        }
    }
}

/// EAGAIN is the ordinary busy answer; EACCES surfaces when the name was
/// created by another account with stingier permissions, which still
/// means somebody else owns it.
#[cfg(unix)]
fn contended(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EAGAIN) | Some(libc::EACCES)
    )
}

impl Drop for MachineLock {
    fn drop(&mut self) {
        self.release();
    }
}
