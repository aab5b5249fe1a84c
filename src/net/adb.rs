//! Async wrapper around the `adb` command line tool.
//!
//! The pairing protocol itself belongs to adb; ADBee only runs
//! `adb pair <ip:port> <code>` and `adb connect <ip:port>` and interprets
//! their output.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Marker printed by `adb pair` on success.
const PAIR_SUCCESS_MARKER: &str = "Successfully paired";

/// Errors that can occur while running adb.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdbError {
    /// The adb process could not be started.
    #[error("failed to run adb: {0}")]
    Spawn(Arc<str>),

    /// adb did not finish in time.
    #[error("adb {command} timed out after {}s", .after.as_secs())]
    Timeout {
        command: &'static str,
        after: Duration,
    },

    /// `adb pair` ran but did not report success.
    #[error("pairing failed: {0}")]
    PairingFailed(Arc<str>),

    /// `adb connect` ran but did not report a connection.
    #[error("connection failed: {0}")]
    ConnectFailed(Arc<str>),

    /// The operation was cancelled before it completed.
    #[error("cancelled")]
    Cancelled,
}

/// Per-command timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdbTimeouts {
    pub pair: Duration,
    pub connect: Duration,
}

impl Default for AdbTimeouts {
    fn default() -> Self {
        Self {
            pair: Duration::from_secs(30),
            connect: Duration::from_secs(5),
        }
    }
}

/// Runs adb subcommands.
#[derive(Debug, Clone)]
pub struct AdbClient {
    program: PathBuf,
    timeouts: AdbTimeouts,
}

impl AdbClient {
    /// Creates a client for the given adb program.
    pub fn new(program: impl Into<PathBuf>, timeouts: AdbTimeouts) -> Self {
        Self {
            program: program.into(),
            timeouts,
        }
    }

    /// The adb program this client runs.
    #[inline]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Pairs with the device's pairing service.
    ///
    /// The code is passed to adb but never logged.
    #[instrument(skip(self, code), fields(%addr))]
    pub async fn pair(&self, addr: SocketAddr, code: &str) -> Result<(), AdbError> {
        info!("Executing: adb pair {addr} ******");

        let output = self
            .run("pair", &[addr.to_string().as_str(), code], self.timeouts.pair)
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if pair_succeeded(output.status.success(), &stdout) {
            info!("Successfully paired");
            Ok(())
        } else {
            let detail = failure_detail(&stdout, &stderr);
            warn!(detail = %detail, "Pairing failed");
            Err(AdbError::PairingFailed(Arc::from(detail)))
        }
    }

    /// Connects to the device's debug service.
    #[instrument(skip(self), fields(%addr))]
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), AdbError> {
        let output = self
            .run("connect", &[addr.to_string().as_str()], self.timeouts.connect)
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if connect_succeeded(output.status.success(), &stdout, &stderr) {
            info!("Connected");
            Ok(())
        } else {
            let detail = failure_detail(&stdout, &stderr);
            debug!(detail = %detail, "Connection attempt failed");
            Err(AdbError::ConnectFailed(Arc::from(detail)))
        }
    }

    /// Connects with a fixed delay between attempts.
    ///
    /// Returns the last error once `attempts` are exhausted, or
    /// [`AdbError::Cancelled`] as soon as `cancel` fires.
    pub async fn connect_with_retries(
        &self,
        addr: SocketAddr,
        attempts: u32,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), AdbError> {
        let attempts = attempts.max(1);
        let mut last_error = AdbError::Cancelled;

        for attempt in 1..=attempts {
            info!(%addr, attempt, attempts, "Connecting");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AdbError::Cancelled),
                result = self.connect(addr) => result,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(%addr, attempt, error = %e, "Connection failed");
                    last_error = e;
                }
            }

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AdbError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        warn!(%addr, attempts, "Gave up connecting");
        Err(last_error)
    }

    async fn run(
        &self,
        command: &'static str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output, AdbError> {
        let child = Command::new(&self.program)
            .arg(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdbError::Spawn(Arc::from(e.to_string())))?;

        // On timeout the future is dropped, which kills the child.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| AdbError::Spawn(Arc::from(e.to_string()))),
            Err(_) => {
                warn!(command, "adb timed out");
                Err(AdbError::Timeout {
                    command,
                    after: timeout,
                })
            }
        }
    }
}

/// `adb pair` exits 0 on some failures, so the success line is required too.
pub fn pair_succeeded(exit_ok: bool, stdout: &str) -> bool {
    exit_ok && stdout.contains(PAIR_SUCCESS_MARKER)
}

/// Accepts both "connected to ..." and "already connected to ...".
pub fn connect_succeeded(exit_ok: bool, stdout: &str, stderr: &str) -> bool {
    let combined = format!("{stdout}{stderr}").to_lowercase();
    exit_ok && combined.contains("connected") && !combined.contains("failed")
}

fn failure_detail(stdout: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}
