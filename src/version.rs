use semver::Version;
use thiserror::Error;

/// Versioned application directories are named `app-<semver>`. The prefix
/// match is case-sensitive: install tooling always writes lowercase.
pub const APP_DIR_PREFIX: &str = "app-";

#[derive(Debug, Error)]
#[error("invalid semver {input:?}: {source}")]
pub struct VersionError {
    pub input: String,
    #[source]
    source: semver::Error,
}

/// Strict semver 2.0 parse (delegated to the `semver` crate).
pub fn parse(s: &str) -> Result<Version, VersionError> {
    Version::parse(s).map_err(|source| VersionError {
        input: s.to_string(),
        source,
    })
}

/// Extract the version from an `app-<semver>` directory basename.
///
/// Returns `None` for a missing or wrong-case prefix and for an
/// unparseable remainder — callers skip such entries, never abort.
pub fn from_app_dir(name: &str) -> Option<Version> {
    let rest = name.strip_prefix(APP_DIR_PREFIX)?;
    parse(rest).ok()
}
