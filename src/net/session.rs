//! A single pairing attempt.
//!
//! # How Pairing Works
//!
//! 1. The host shows a QR code carrying a fresh service name and code
//! 2. The phone scans it and announces `_adb-tls-pairing._tcp` under that name
//! 3. The session sees the announcement and runs `adb pair ip:port code`
//! 4. Once paired, the phone announces (or already announces)
//!    `_adb-tls-connect._tcp`; the session runs `adb connect` against it
//!
//! Step 4 happens twice over: an opportunistic connect right after pairing
//! against the connect service seen most recently for that device, and a
//! regular connect whenever the connect service is (re)announced. Whichever
//! wins, the endpoint is connected only once.
//!
//! Everything is driven by [`ServiceEvent`] streams, so tests can feed the
//! session without touching the network.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::adb::{AdbClient, AdbError};
use super::credentials::PairingCredentials;
use super::discovery::{DiscoveredService, ServiceEvent};
use crate::config::Config;

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Events reported to whoever drives the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// `adb pair` succeeded against the device at `address`.
    Paired { address: IpAddr },
    /// `adb pair` failed or could not be attempted.
    PairingFailed { reason: Arc<str> },
    /// `adb connect` succeeded.
    Connected { endpoint: SocketAddr },
    /// All connection attempts to `endpoint` failed.
    ConnectFailed { endpoint: SocketAddr, reason: Arc<str> },
}

/// State of a pairing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the phone to scan the code
    #[default]
    Waiting,
    /// `adb pair` is running
    Pairing,
    /// Paired, waiting for a connection
    Paired,
    /// Connected to the device
    Connected,
    /// Pairing failed
    Failed,
    /// Session was cancelled
    Cancelled,
}

/// Retry policy for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub opportunistic_attempts: u32,
    pub opportunistic_retry_delay: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            connect_attempts: config.connect_attempts,
            connect_retry_delay: config.connect_retry_delay,
            opportunistic_attempts: config.opportunistic_attempts,
            opportunistic_retry_delay: config.opportunistic_retry_delay,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Known connect services, keyed two ways.
#[derive(Debug, Default)]
struct ConnectServices {
    /// Full name to endpoint, for removals.
    by_name: HashMap<Arc<str>, SocketAddr>,
    /// Most recently announced endpoint per device address.
    by_ip: HashMap<IpAddr, SocketAddr>,
}

struct Shared {
    credentials: PairingCredentials,
    adb: AdbClient,
    settings: SessionSettings,
    events: mpsc::Sender<SessionEvent>,
    state: RwLock<SessionState>,
    /// Address of the device paired in this session.
    paired: RwLock<Option<IpAddr>>,
    /// Pairing services handled since they were last announced, by full name.
    attempted: Mutex<HashSet<Arc<str>>>,
    connect_services: Mutex<ConnectServices>,
    links: Mutex<Links>,
}

/// Connection bookkeeping; both sets live under one lock so a connect is
/// never started twice for the same endpoint.
#[derive(Debug, Default)]
struct Links {
    connected: HashSet<SocketAddr>,
    in_flight: HashSet<SocketAddr>,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        if *current != SessionState::Cancelled {
            *current = state;
        }
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Session event receiver dropped");
        }
    }
}

/// A running pairing attempt. Dropping it cancels all of its work.
pub struct PairingSession {
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl PairingSession {
    /// Starts watching both service streams.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(service = %credentials))]
    pub fn start(
        credentials: PairingCredentials,
        adb: AdbClient,
        settings: SessionSettings,
        pairing_events: mpsc::Receiver<ServiceEvent>,
        connect_events: mpsc::Receiver<ServiceEvent>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let shared = Arc::new(Shared {
            credentials,
            adb,
            settings,
            events: tx,
            state: RwLock::new(SessionState::Waiting),
            paired: RwLock::new(None),
            attempted: Mutex::new(HashSet::new()),
            connect_services: Mutex::new(ConnectServices::default()),
            links: Mutex::new(Links::default()),
        });

        tokio::spawn(watch_pairing(shared.clone(), pairing_events, cancel.clone()));
        tokio::spawn(watch_connect(shared.clone(), connect_events, cancel.clone()));

        info!("Watching for pairing and connection services");
        (Self { shared, cancel }, rx)
    }

    /// Credentials this session pairs with.
    #[inline]
    pub fn credentials(&self) -> &PairingCredentials {
        &self.shared.credentials
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Endpoints connected during this session.
    pub fn connected_endpoints(&self) -> Vec<SocketAddr> {
        self.shared.links.lock().connected.iter().copied().collect()
    }

    /// Stops all watchers and in-flight adb calls.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!(service = %self.shared.credentials, "Pairing session cancelled");
            *self.shared.state.write() = SessionState::Cancelled;
            self.cancel.cancel();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PairingSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn watch_pairing(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<ServiceEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            ServiceEvent::Found(service) => {
                if !shared.credentials.matches_instance(&service.fullname) {
                    debug!(name = %service.fullname, "Ignoring pairing service from another session");
                    continue;
                }
                if !shared.attempted.lock().insert(service.fullname.clone()) {
                    continue;
                }
                info!(name = %service.fullname, "Pairing service found");
                pair_device(&shared, &service, &cancel).await;
            }
            ServiceEvent::Removed(name) => {
                // A rescan of the same code re-announces the instance; pair again then.
                if shared.attempted.lock().remove(&name) {
                    debug!(name = %name, "Pairing service removed");
                }
            }
        }
    }
    debug!("Pairing watcher stopped");
}

async fn pair_device(shared: &Arc<Shared>, service: &DiscoveredService, cancel: &CancellationToken) {
    let Some(addr) = service.socket_addr() else {
        warn!(name = %service.fullname, "Could not get device IP address");
        shared.set_state(SessionState::Failed);
        shared
            .emit(SessionEvent::PairingFailed {
                reason: Arc::from("device did not announce an address"),
            })
            .await;
        return;
    };

    shared.set_state(SessionState::Pairing);
    let code = shared.credentials.code();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AdbError::Cancelled),
        result = shared.adb.pair(addr, &code) => result,
    };

    match result {
        Ok(()) => {
            let ip = addr.ip();
            *shared.paired.write() = Some(ip);
            shared.set_state(SessionState::Paired);
            info!(%ip, "Paired, waiting for device to announce connection service");
            shared.emit(SessionEvent::Paired { address: ip }).await;

            let known = shared.connect_services.lock().by_ip.get(&ip).copied();
            if let Some(endpoint) = known {
                info!(%endpoint, "Opportunistic connection attempt");
                tokio::spawn(connect_device(
                    shared.clone(),
                    endpoint,
                    shared.settings.opportunistic_attempts,
                    shared.settings.opportunistic_retry_delay,
                    cancel.clone(),
                ));
            }
        }
        Err(AdbError::Cancelled) => {}
        Err(e) => {
            shared.set_state(SessionState::Failed);
            shared
                .emit(SessionEvent::PairingFailed {
                    reason: Arc::from(e.to_string()),
                })
                .await;
        }
    }
}

async fn watch_connect(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<ServiceEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            ServiceEvent::Found(service) => {
                let Some(endpoint) = service.socket_addr() else {
                    continue;
                };

                {
                    let mut services = shared.connect_services.lock();
                    services.by_name.insert(service.fullname.clone(), endpoint);
                    services.by_ip.insert(endpoint.ip(), endpoint);
                }

                let paired = *shared.paired.read();
                if paired != Some(endpoint.ip()) {
                    debug!(%endpoint, "Connect service seen before pairing, remembering it");
                    continue;
                }

                info!(%endpoint, "Connect service found");
                tokio::spawn(connect_device(
                    shared.clone(),
                    endpoint,
                    shared.settings.connect_attempts,
                    shared.settings.connect_retry_delay,
                    cancel.clone(),
                ));
            }
            ServiceEvent::Removed(name) => {
                let removed = {
                    let mut services = shared.connect_services.lock();
                    let removed = services.by_name.remove(&name);
                    if let Some(endpoint) = removed {
                        if services.by_ip.get(&endpoint.ip()) == Some(&endpoint) {
                            services.by_ip.remove(&endpoint.ip());
                        }
                    }
                    removed
                };
                if let Some(endpoint) = removed {
                    // A re-announcement (e.g. wireless debugging toggled) connects again.
                    shared.links.lock().connected.remove(&endpoint);
                    debug!(%endpoint, "Connect service removed");
                }
            }
        }
    }
    debug!("Connect watcher stopped");
}

async fn connect_device(
    shared: Arc<Shared>,
    endpoint: SocketAddr,
    attempts: u32,
    delay: Duration,
    cancel: CancellationToken,
) {
    {
        let mut links = shared.links.lock();
        if links.connected.contains(&endpoint) {
            return;
        }
        if !links.in_flight.insert(endpoint) {
            debug!(%endpoint, "Connection already in progress");
            return;
        }
    }

    let result = shared
        .adb
        .connect_with_retries(endpoint, attempts, delay, &cancel)
        .await;

    {
        let mut links = shared.links.lock();
        links.in_flight.remove(&endpoint);
        if result.is_ok() {
            links.connected.insert(endpoint);
        }
    }

    match result {
        Ok(()) => {
            shared.set_state(SessionState::Connected);
            shared.emit(SessionEvent::Connected { endpoint }).await;
        }
        Err(AdbError::Cancelled) => {}
        Err(e) => {
            shared
                .emit(SessionEvent::ConnectFailed {
                    endpoint,
                    reason: Arc::from(e.to_string()),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::adb::AdbTimeouts;
    use crate::net::discovery::ServiceKind;
    use std::net::Ipv4Addr;

    const PHONE: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    fn credentials() -> PairingCredentials {
        PairingCredentials::new("adbee-k3v9qa", "482913").unwrap()
    }

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            connect_attempts: 2,
            connect_retry_delay: Duration::from_millis(10),
            opportunistic_attempts: 2,
            opportunistic_retry_delay: Duration::from_millis(10),
        }
    }

    fn pairing_service(instance: &str, port: u16) -> ServiceEvent {
        ServiceEvent::Found(DiscoveredService::new(
            ServiceKind::Pairing,
            format!("{instance}._adb-tls-pairing._tcp.local."),
            [PHONE],
            port,
        ))
    }

    const PAIRING_NAME: &str = "adbee-k3v9qa._adb-tls-pairing._tcp.local.";
    const CONNECT_NAME: &str = "adb-R58M12ABCDE-xYz1._adb-tls-connect._tcp.local.";

    fn connect_service(ip: IpAddr, port: u16) -> ServiceEvent {
        ServiceEvent::Found(DiscoveredService::new(
            ServiceKind::Connect,
            CONNECT_NAME,
            [ip],
            port,
        ))
    }

    fn removed(fullname: &str) -> ServiceEvent {
        ServiceEvent::Removed(Arc::from(fullname))
    }

    async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session event channel closed")
    }

    async fn assert_quiet(rx: &mut mpsc::Receiver<SessionEvent>) {
        let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "unexpected event: {result:?}");
    }

    #[test]
    fn test_settings_from_config() {
        let settings = SessionSettings::default();
        assert_eq!(settings.connect_attempts, 3);
        assert_eq!(settings.connect_retry_delay, Duration::from_secs(2));
        assert_eq!(settings.opportunistic_attempts, 3);
        assert_eq!(settings.opportunistic_retry_delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancel_marks_session_cancelled() {
        let (_pair_tx, pair_rx) = mpsc::channel(4);
        let (_conn_tx, conn_rx) = mpsc::channel(4);
        let adb = AdbClient::new("/definitely/not/here/adb", AdbTimeouts::default());

        let (session, _events) =
            PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);
        assert_eq!(session.state(), SessionState::Waiting);

        session.cancel();
        assert!(session.is_cancelled());
        assert_eq!(session.state(), SessionState::Cancelled);
    }

    #[tokio::test]
    async fn test_foreign_pairing_service_is_ignored() {
        let (pair_tx, pair_rx) = mpsc::channel(4);
        let (_conn_tx, conn_rx) = mpsc::channel(4);
        let adb = AdbClient::new("/definitely/not/here/adb", AdbTimeouts::default());

        let (session, mut events) =
            PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

        pair_tx.send(pairing_service("studio-abc123", 37_123)).await.unwrap();
        assert_quiet(&mut events).await;
        assert_eq!(session.state(), SessionState::Waiting);
    }

    #[tokio::test]
    async fn test_missing_adb_reports_pairing_failure() {
        let (pair_tx, pair_rx) = mpsc::channel(4);
        let (_conn_tx, conn_rx) = mpsc::channel(4);
        let adb = AdbClient::new("/definitely/not/here/adb", AdbTimeouts::default());

        let (session, mut events) =
            PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

        pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
        let event = next_event(&mut events).await;
        assert!(matches!(event, SessionEvent::PairingFailed { .. }), "{event:?}");
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_service_without_address_reports_failure() {
        let (pair_tx, pair_rx) = mpsc::channel(4);
        let (_conn_tx, conn_rx) = mpsc::channel(4);
        let adb = AdbClient::new("/definitely/not/here/adb", AdbTimeouts::default());

        let (_session, mut events) =
            PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

        pair_tx
            .send(ServiceEvent::Found(DiscoveredService::new(
                ServiceKind::Pairing,
                "adbee-k3v9qa._adb-tls-pairing._tcp.local.",
                [],
                37_123,
            )))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PairingFailed {
                reason: Arc::from("device did not announce an address")
            }
        );
    }

    #[cfg(unix)]
    mod with_fake_adb {
        use super::*;
        use crate::net::test_support::write_fake_adb;
        use tempfile::TempDir;

        /// A fake adb that pairs successfully and connects on the first try.
        /// Every invocation is appended to `calls`.
        fn happy_adb(dir: &TempDir) -> (AdbClient, std::path::PathBuf) {
            let calls = dir.path().join("calls");
            let script = write_fake_adb(
                dir,
                &format!(
                    "echo \"$@\" >> {calls}\n\
                     case \"$1\" in\n\
                       pair) echo \"Successfully paired to $2 [guid=adb-x]\" ;;\n\
                       connect) echo \"connected to $2\" ;;\n\
                     esac",
                    calls = calls.display()
                ),
            );
            (AdbClient::new(script, AdbTimeouts::default()), calls)
        }

        fn read_calls(path: &std::path::Path) -> Vec<String> {
            std::fs::read_to_string(path)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        #[tokio::test]
        async fn test_pair_then_connect_on_announcement() {
            let dir = TempDir::new().unwrap();
            let (adb, calls) = happy_adb(&dir);
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (conn_tx, conn_rx) = mpsc::channel(4);

            let (session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Paired { address: PHONE }
            );
            assert_eq!(session.state(), SessionState::Paired);

            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            let endpoint = SocketAddr::new(PHONE, 41_005);
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Connected { endpoint }
            );
            assert_eq!(session.state(), SessionState::Connected);
            assert_eq!(session.connected_endpoints(), vec![endpoint]);

            assert_eq!(
                read_calls(&calls),
                vec![
                    "pair 192.168.1.20:37123 482913".to_string(),
                    "connect 192.168.1.20:41005".to_string(),
                ]
            );
        }

        #[tokio::test]
        async fn test_opportunistic_connect_uses_earlier_announcement() {
            let dir = TempDir::new().unwrap();
            let (adb, _calls) = happy_adb(&dir);
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (conn_tx, conn_rx) = mpsc::channel(4);

            let (_session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            // Wireless debugging was already on; the connect service is known up front.
            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            assert_quiet(&mut events).await;

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Paired { address: PHONE }
            );
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Connected {
                    endpoint: SocketAddr::new(PHONE, 41_005)
                }
            );
        }

        #[tokio::test]
        async fn test_repeated_announcements_connect_once() {
            let dir = TempDir::new().unwrap();
            let (adb, calls) = happy_adb(&dir);
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (conn_tx, conn_rx) = mpsc::channel(8);

            let (_session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            // Same pairing service announced twice only pairs once.
            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Paired { address: PHONE }
            );

            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            assert!(matches!(
                next_event(&mut events).await,
                SessionEvent::Connected { .. }
            ));

            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            assert_quiet(&mut events).await;

            let calls = read_calls(&calls);
            assert_eq!(calls.iter().filter(|c| c.starts_with("pair")).count(), 1);
            assert_eq!(calls.iter().filter(|c| c.starts_with("connect")).count(), 1);
        }

        #[tokio::test]
        async fn test_other_devices_are_not_connected() {
            let dir = TempDir::new().unwrap();
            let (adb, calls) = happy_adb(&dir);
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (conn_tx, conn_rx) = mpsc::channel(4);

            let (_session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            next_event(&mut events).await;

            let other = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 77));
            conn_tx.send(connect_service(other, 40_000)).await.unwrap();
            assert_quiet(&mut events).await;

            assert!(read_calls(&calls).iter().all(|c| !c.starts_with("connect")));
        }

        #[tokio::test]
        async fn test_connect_failure_is_reported() {
            let dir = TempDir::new().unwrap();
            let script = write_fake_adb(
                &dir,
                "case \"$1\" in\n\
                   pair) echo \"Successfully paired to $2\" ;;\n\
                   connect) echo \"failed to connect to '$2': Connection refused\"; exit 1 ;;\n\
                 esac",
            );
            let adb = AdbClient::new(script, AdbTimeouts::default());
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (conn_tx, conn_rx) = mpsc::channel(4);

            let (session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            next_event(&mut events).await;

            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            match next_event(&mut events).await {
                SessionEvent::ConnectFailed { endpoint, reason } => {
                    assert_eq!(endpoint, SocketAddr::new(PHONE, 41_005));
                    assert!(reason.contains("Connection refused"), "{reason}");
                }
                other => panic!("unexpected event {other:?}"),
            }
            assert_eq!(session.state(), SessionState::Paired);
        }

        #[tokio::test]
        async fn test_rescan_after_failed_pairing_pairs_again() {
            let dir = TempDir::new().unwrap();
            let marker = dir.path().join("failed-once");
            let script = write_fake_adb(
                &dir,
                &format!(
                    "case \"$1\" in\n\
                       pair) if [ -f {marker} ]; then\n\
                               echo \"Successfully paired to $2\"\n\
                             else\n\
                               touch {marker}\n\
                               echo \"Failed: Wrong password or connection was dropped.\"\n\
                               exit 1\n\
                             fi ;;\n\
                     esac",
                    marker = marker.display()
                ),
            );
            let adb = AdbClient::new(script, AdbTimeouts::default());
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (_conn_tx, conn_rx) = mpsc::channel(4);

            let (session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            assert!(matches!(
                next_event(&mut events).await,
                SessionEvent::PairingFailed { .. }
            ));
            assert_eq!(session.state(), SessionState::Failed);

            // The phone withdraws the service and announces it again on rescan.
            pair_tx.send(removed(PAIRING_NAME)).await.unwrap();
            pair_tx.send(pairing_service("adbee-k3v9qa", 37_124)).await.unwrap();
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Paired { address: PHONE }
            );
            assert_eq!(session.state(), SessionState::Paired);
        }

        #[tokio::test]
        async fn test_reannounced_connect_service_reconnects() {
            let dir = TempDir::new().unwrap();
            let (adb, calls) = happy_adb(&dir);
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (conn_tx, conn_rx) = mpsc::channel(4);

            let (session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            next_event(&mut events).await;

            let endpoint = SocketAddr::new(PHONE, 41_005);
            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Connected { endpoint }
            );

            // Wireless debugging toggled off and on again.
            conn_tx.send(removed(CONNECT_NAME)).await.unwrap();
            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Connected { endpoint }
            );
            assert_eq!(session.connected_endpoints(), vec![endpoint]);

            let calls = read_calls(&calls);
            assert_eq!(calls.iter().filter(|c| c.starts_with("connect")).count(), 2);
        }

        #[tokio::test]
        async fn test_opportunistic_connect_gives_up_after_its_attempts() {
            let dir = TempDir::new().unwrap();
            let calls = dir.path().join("calls");
            let script = write_fake_adb(
                &dir,
                &format!(
                    "echo \"$@\" >> {calls}\n\
                     case \"$1\" in\n\
                       pair) echo \"Successfully paired to $2\" ;;\n\
                       connect) echo \"failed to connect to '$2': Connection refused\"; exit 1 ;;\n\
                     esac",
                    calls = calls.display()
                ),
            );
            let adb = AdbClient::new(script, AdbTimeouts::default());
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (conn_tx, conn_rx) = mpsc::channel(4);

            let (session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            assert_quiet(&mut events).await;

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Paired { address: PHONE }
            );
            match next_event(&mut events).await {
                SessionEvent::ConnectFailed { endpoint, .. } => {
                    assert_eq!(endpoint, SocketAddr::new(PHONE, 41_005));
                }
                other => panic!("unexpected event {other:?}"),
            }
            assert_quiet(&mut events).await;
            assert!(session.connected_endpoints().is_empty());

            let calls = read_calls(&calls);
            assert_eq!(
                calls.iter().filter(|c| c.starts_with("connect")).count(),
                fast_settings().opportunistic_attempts as usize
            );
        }

        #[tokio::test]
        async fn test_removed_connect_service_is_not_used_after_pairing() {
            let dir = TempDir::new().unwrap();
            let (adb, calls) = happy_adb(&dir);
            let (pair_tx, pair_rx) = mpsc::channel(4);
            let (conn_tx, conn_rx) = mpsc::channel(4);

            let (_session, mut events) =
                PairingSession::start(credentials(), adb, fast_settings(), pair_rx, conn_rx);

            conn_tx.send(connect_service(PHONE, 41_005)).await.unwrap();
            conn_tx.send(removed(CONNECT_NAME)).await.unwrap();
            assert_quiet(&mut events).await;

            pair_tx.send(pairing_service("adbee-k3v9qa", 37_123)).await.unwrap();
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::Paired { address: PHONE }
            );
            assert_quiet(&mut events).await;

            assert!(read_calls(&calls).iter().all(|c| !c.starts_with("connect")));
        }
    }
}
