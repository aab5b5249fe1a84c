//! Core application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use gpui::Global;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::net::{PairingCredentials, SessionEvent};
use crate::qr::QrMatrix;

/// Default lifetime of a toast.
const DEFAULT_TOAST_DURATION: Duration = Duration::from_secs(5);

/// What the status label currently says.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PairingStatus {
    /// Networking is still starting up.
    #[default]
    Starting,
    /// QR code is shown, waiting for the phone to scan it.
    Waiting,
    /// `adb pair` succeeded, waiting for `adb connect`.
    Paired,
    /// The device is connected.
    Connected,
    /// Something went wrong; the message is shown verbatim.
    Error(Arc<str>),
}

impl PairingStatus {
    /// Label text for the status line.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            PairingStatus::Starting => "Preparing…".to_string(),
            PairingStatus::Waiting => "Waiting for device to scan QR code...".to_string(),
            PairingStatus::Paired => "Paired! Waiting for connection...".to_string(),
            PairingStatus::Connected => "Device connected successfully!".to_string(),
            PairingStatus::Error(msg) => msg.to_string(),
        }
    }

    /// Whether the label should use the success colour.
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, PairingStatus::Paired | PairingStatus::Connected)
    }

    #[inline]
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, PairingStatus::Error(_))
    }
}

/// A short-lived notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: Arc<str>,
    pub shown_at: Instant,
    pub duration: Duration,
}

impl Toast {
    #[must_use]
    pub fn new(message: impl AsRef<str>, duration: Duration) -> Self {
        Self {
            message: Arc::from(message.as_ref()),
            shown_at: Instant::now(),
            duration,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.shown_at.elapsed() >= self.duration
    }
}

/// The pairing attempt currently on screen.
#[derive(Debug, Clone)]
pub struct ActivePairing {
    pub credentials: PairingCredentials,
    /// `None` when the payload could not be encoded.
    pub qr: Option<QrMatrix>,
}

/// Shared application state accessible across the app.
/// This is stored as a GPUI global for easy access.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<AppStateInner>>,
    /// Bumped on every mutation so views can skip redundant renders.
    revision: Arc<AtomicU64>,
    /// Wakes the networking thread when the user asks for a new code.
    regenerate: Arc<Notify>,
    /// Shutdown signal for graceful termination.
    shutdown: CancellationToken,
}

struct AppStateInner {
    status: PairingStatus,
    pairing: Option<ActivePairing>,
    /// Endpoint of the last connected device.
    connected_endpoint: Option<Arc<str>>,
    toast: Option<Toast>,
    toast_duration: Duration,
}

impl AppState {
    /// Creates a new app state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_toast_duration(DEFAULT_TOAST_DURATION)
    }

    /// Creates a new app state with a custom toast lifetime.
    #[must_use]
    pub fn with_toast_duration(toast_duration: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AppStateInner {
                status: PairingStatus::Starting,
                pairing: None,
                connected_endpoint: None,
                toast: None,
                toast_duration,
            })),
            revision: Arc::new(AtomicU64::new(0)),
            regenerate: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut AppStateInner) -> R) -> R {
        let result = f(&mut self.inner.write());
        self.revision.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Monotonic counter of state changes.
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Shows a new pairing attempt, replacing the previous one.
    pub fn begin_pairing(&self, credentials: PairingCredentials, qr: Option<QrMatrix>) {
        self.update(|inner| {
            inner.pairing = Some(ActivePairing { credentials, qr });
            inner.status = PairingStatus::Waiting;
            inner.connected_endpoint = None;
            inner.toast = None;
        });
    }

    /// Applies a session event to the status and toast.
    pub fn apply_event(&self, event: &SessionEvent) {
        self.update(|inner| match event {
            SessionEvent::Paired { .. } => {
                inner.status = PairingStatus::Paired;
            }
            SessionEvent::PairingFailed { reason } => {
                inner.status = PairingStatus::Error(Arc::from(format!("Pairing failed: {reason}")));
            }
            SessionEvent::Connected { endpoint } => {
                let endpoint = endpoint.to_string();
                inner.status = PairingStatus::Connected;
                inner.toast = Some(Toast::new(
                    format!("✓ Connected to {endpoint}"),
                    inner.toast_duration,
                ));
                inner.connected_endpoint = Some(Arc::from(endpoint));
            }
            SessionEvent::ConnectFailed { endpoint, .. } => {
                // Stay "paired"; the phone may still re-announce its connect service.
                inner.toast = Some(Toast::new(
                    format!("Could not connect to {endpoint}"),
                    inner.toast_duration,
                ));
            }
        });
    }

    /// Shows an error in the status line.
    pub fn set_error(&self, message: impl AsRef<str>) {
        self.update(|inner| inner.status = PairingStatus::Error(Arc::from(message.as_ref())));
    }

    /// Gets the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> PairingStatus {
        self.inner.read().status.clone()
    }

    /// Gets the pairing attempt on screen, if any.
    #[inline]
    #[must_use]
    pub fn pairing(&self) -> Option<ActivePairing> {
        self.inner.read().pairing.clone()
    }

    #[inline]
    #[must_use]
    pub fn connected_endpoint(&self) -> Option<Arc<str>> {
        self.inner.read().connected_endpoint.clone()
    }

    /// The toast to display, if one is still live.
    #[must_use]
    pub fn active_toast(&self) -> Option<Toast> {
        self.inner
            .read()
            .toast
            .as_ref()
            .filter(|t| !t.is_expired())
            .cloned()
    }

    /// Asks the networking side for fresh credentials.
    pub fn request_new_pairing(&self) {
        self.regenerate.notify_one();
    }

    /// Resolves once a new pairing has been requested.
    pub async fn new_pairing_requested(&self) {
        self.regenerate.notified().await;
    }

    /// Signal shutdown to all components.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Check if shutdown has been signaled.
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled on shutdown.
    #[inline]
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Default for AppState {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Global for AppState {}
