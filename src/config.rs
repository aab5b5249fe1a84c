//! Runtime configuration.
//!
//! ADBee has no settings file. Every knob has a sensible default and a few
//! can be overridden from the environment:
//!
//! | Variable                      | Effect                                   |
//! |-------------------------------|------------------------------------------|
//! | `ADBEE_ADB`                   | Path to the `adb` binary                 |
//! | `ADBEE_SERVICE_PREFIX`        | Prefix of the advertised service name    |
//! | `ADBEE_PAIR_TIMEOUT_SECS`     | Timeout for a single `adb pair` call     |
//! | `ADBEE_CONNECT_TIMEOUT_SECS`  | Timeout for a single `adb connect` call  |

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::debug;

/// Name of the adb executable looked up on `PATH`.
#[cfg(windows)]
const ADB_BINARY: &str = "adb.exe";
#[cfg(not(windows))]
const ADB_BINARY: &str = "adb";

/// Cached result of the `PATH` lookup.
static ADB_PATH_CACHE: OnceCell<PathBuf> = OnceCell::new();

/// Errors produced while building the configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held something that is not a number of seconds.
    #[error("invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    /// The service prefix is empty or contains characters that break the QR payload.
    #[error("invalid service prefix: {0:?}")]
    InvalidPrefix(String),

    /// `adb` could not be found.
    #[error("'adb' command not found in PATH")]
    AdbNotFound,

    /// An explicitly configured adb path does not exist.
    #[error("configured adb program does not exist: {0}")]
    AdbMissing(PathBuf),
}

/// Tunables for a pairing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Explicit adb program; `None` means search `PATH`.
    pub adb_program: Option<PathBuf>,
    /// Prefix of the service name placed in the QR code.
    pub service_prefix: String,
    pub pair_timeout: Duration,
    pub connect_timeout: Duration,
    /// Attempts made when the connect service is announced.
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    /// Attempts made right after pairing against the last seen connect service.
    pub opportunistic_attempts: u32,
    pub opportunistic_retry_delay: Duration,
    /// Edge length the QR image is scaled towards.
    pub qr_size_px: u32,
    pub toast_duration: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adb_program: None,
            service_prefix: "adbee".to_string(),
            pair_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(2),
            opportunistic_attempts: 3,
            opportunistic_retry_delay: Duration::from_secs(1),
            qr_size_px: 280,
            toast_duration: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from the process environment, keeping every
    /// valid override and returning the rejected ones alongside.
    pub fn from_env_lenient() -> (Self, Vec<ConfigError>) {
        Self::from_lookup_lenient(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Fails on the first invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (config, errors) = Self::from_lookup_lenient(lookup);
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(config),
        }
    }

    /// Like [`Config::from_lookup`], but an invalid variable only leaves its
    /// own setting at the default.
    pub fn from_lookup_lenient<F>(lookup: F) -> (Self, Vec<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut errors = Vec::new();

        if let Some(path) = lookup("ADBEE_ADB").filter(|v| !v.trim().is_empty()) {
            config.adb_program = Some(PathBuf::from(path.trim()));
        }

        if let Some(prefix) = lookup("ADBEE_SERVICE_PREFIX") {
            let prefix = prefix.trim();
            if is_valid_prefix(prefix) {
                config.service_prefix = prefix.to_string();
            } else {
                errors.push(ConfigError::InvalidPrefix(prefix.to_string()));
            }
        }

        match parse_secs(&lookup, "ADBEE_PAIR_TIMEOUT_SECS") {
            Ok(Some(secs)) => config.pair_timeout = secs,
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
        match parse_secs(&lookup, "ADBEE_CONNECT_TIMEOUT_SECS") {
            Ok(Some(secs)) => config.connect_timeout = secs,
            Ok(None) => {}
            Err(e) => errors.push(e),
        }

        (config, errors)
    }
}

fn parse_secs<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
        _ => Err(ConfigError::InvalidNumber { var, value: raw }),
    }
}

/// `;`, `:` and `\` are separators in the `WIFI:` payload.
fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= 32
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Resolves the adb program to run.
///
/// An explicit path is checked every time; a `PATH` hit is cached for the
/// lifetime of the process.
pub fn find_adb(config: &Config) -> Result<PathBuf, ConfigError> {
    if let Some(explicit) = &config.adb_program {
        return if explicit.is_file() {
            Ok(explicit.clone())
        } else {
            Err(ConfigError::AdbMissing(explicit.clone()))
        };
    }

    ADB_PATH_CACHE
        .get_or_try_init(|| {
            let path_var = std::env::var_os("PATH").ok_or(ConfigError::AdbNotFound)?;
            search_path(std::env::split_paths(&path_var), ADB_BINARY)
                .ok_or(ConfigError::AdbNotFound)
        })
        .cloned()
}

/// Returns the first directory entry named `binary` that is a regular file.
fn search_path<I>(dirs: I, binary: &str) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    dirs.into_iter()
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
        .inspect(|found| debug!(path = %found.display(), "Found adb on PATH"))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
