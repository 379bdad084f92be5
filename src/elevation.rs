use thiserror::Error;

/// Opt-in for running the stub elevated. Anything other than `1`/`true`
/// (case-insensitive) keeps the refusal in place.
pub const ALLOW_ELEVATED_ENV: &str = "SNAPX_CORERUN_ALLOW_ELEVATED_CONTEXT";

#[derive(Debug, Error)]
#[error("running elevated; set {ALLOW_ELEVATED_ENV}=1 to allow")]
pub struct ElevatedError;

/// Refuse to do any work while elevated unless the override is set. When
/// the override is set but the process is not elevated, nothing happens.
pub fn gate() -> Result<(), ElevatedError> {
    if is_elevated() && !env_truthy(ALLOW_ELEVATED_ENV) {
        return Err(ElevatedError);
    }
    Ok(())
}

pub(crate) fn env_truthy(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            v == "1" || v == "true"
        })
        .unwrap_or(false)
}

#[cfg(unix)]
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(windows)]
pub fn is_elevated() -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    unsafe {
        let mut token: HANDLE = std::ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }
        let mut elevation: TOKEN_ELEVATION = std::mem::zeroed();
        let mut returned: u32 = 0;
        let ok = GetTokenInformation(
            token,
            TokenElevation,
            (&mut elevation as *mut TOKEN_ELEVATION).cast(),
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        );
        CloseHandle(token);
        ok != 0 && elevation.TokenIsElevated != 0
    }
}
