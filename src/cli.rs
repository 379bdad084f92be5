use thiserror::Error;

/// Every flag the stub consumes starts with this prefix; anything else on
/// the command line belongs to the managed application and passes through
/// untouched.
pub const FLAG_PREFIX: &str = "--corerun-";
pub const ENV_VAR_FLAG: &str = "--corerun-environment-var";
pub const SUPERVISE_PID_FLAG: &str = "--corerun-supervise-pid";
pub const SUPERVISE_ID_FLAG: &str = "--corerun-supervise-id";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("{ENV_VAR_FLAG} expects KEY=VALUE, got {0:?}")]
    MalformedEnvVar(String),
    #[error("{SUPERVISE_PID_FLAG} expects an integer pid, got {0:?}")]
    BadPid(String),
    #[error("{0} requires a value")]
    MissingValue(String),
    #[error("{SUPERVISE_PID_FLAG} also requires {SUPERVISE_ID_FLAG}")]
    MissingSuperviseId,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Mode {
    /// Plain stub flow: find the newest version and hand over.
    Launch,
    /// Wait for `watched_pid` to exit, gated by a machine-wide lock keyed
    /// on `app_id`, then perform the stub flow.
    Supervise { watched_pid: u32, app_id: String },
}

/// The parsed command line: routing decision, the argv the child will
/// receive, and per-launch environment additions in flag order.
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub mode: Mode,
    pub onward: Vec<String>,
    pub env_extra: Vec<(String, String)>,
}

/// Parse our own argv (without argv[0]). Recognized `--corerun-*` flags
/// consume their value; any other `--corerun-*` token is scrubbed so the
/// child never sees stub plumbing. Everything else keeps its position.
pub fn parse<I>(args: I) -> Result<Invocation, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut onward = Vec::new();
    let mut env_extra = Vec::new();
    let mut watched_pid: Option<u32> = None;
    let mut app_id: Option<String> = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == ENV_VAR_FLAG {
            let raw = args
                .next()
                .ok_or_else(|| CliError::MissingValue(arg.clone()))?;
            let Some((key, value)) = raw.split_once('=') else {
                return Err(CliError::MalformedEnvVar(raw));
            };
            env_extra.push((key.to_string(), value.to_string()));
        } else if arg == SUPERVISE_PID_FLAG {
            let raw = args
                .next()
                .ok_or_else(|| CliError::MissingValue(arg.clone()))?;
            watched_pid = Some(raw.parse().map_err(|_| CliError::BadPid(raw))?);
        } else if arg == SUPERVISE_ID_FLAG {
            app_id = Some(
                args.next()
                    .ok_or_else(|| CliError::MissingValue(arg.clone()))?,
            );
        } else if arg.starts_with(FLAG_PREFIX) {
            // unknown stub flag: scrub it, keep whatever follows
        } else {
            onward.push(arg);
        }
    }

    let mode = match (watched_pid, app_id) {
        (Some(watched_pid), Some(app_id)) => Mode::Supervise {
            watched_pid,
            app_id,
        },
        (Some(_), None) => return Err(CliError::MissingSuperviseId),
        // an identity without a pid has nothing to supervise
        (None, _) => Mode::Launch,
    };

    Ok(Invocation {
        mode,
        onward,
        env_extra,
    })
}
