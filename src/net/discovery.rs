//! Local network discovery of Android wireless debugging services.
//!
//! Android announces two DNS-SD services while wireless debugging is on:
//!
//! - `_adb-tls-pairing._tcp.local.` while the "pair with QR code" flow is
//!   waiting for the host, under the service name taken from the QR code
//! - `_adb-tls-connect._tcp.local.` whenever the device accepts debug
//!   connections
//!
//! mDNS itself is handled by the `mdns-sd` daemon; this module only turns
//! its resolved services into [`DiscoveredService`] values on tokio channels.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent};
use smallvec::SmallVec;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// DNS-SD type announced while the phone waits to be paired.
pub const PAIRING_SERVICE_TYPE: &str = "_adb-tls-pairing._tcp.local.";

/// DNS-SD type announced by a device that accepts debug connections.
pub const CONNECT_SERVICE_TYPE: &str = "_adb-tls-connect._tcp.local.";

/// Capacity of each per-browse event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Maximum number of addresses to store inline (phones usually announce 1-2).
const INLINE_ADDRS: usize = 4;

/// Errors raised by the discovery layer.
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// The mDNS daemon could not be started.
    #[error("failed to start mDNS daemon: {0}")]
    Daemon(Arc<str>),

    /// Browsing for a service type failed.
    #[error("failed to browse {service_type}: {reason}")]
    Browse {
        service_type: &'static str,
        reason: Arc<str>,
    },
}

/// Which of the two ADB services a discovery refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Pairing,
    Connect,
}

impl ServiceKind {
    /// The DNS-SD service type for this kind.
    #[inline]
    #[must_use]
    pub const fn service_type(self) -> &'static str {
        match self {
            ServiceKind::Pairing => PAIRING_SERVICE_TYPE,
            ServiceKind::Connect => CONNECT_SERVICE_TYPE,
        }
    }
}

/// A resolved ADB service on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub kind: ServiceKind,
    /// Full DNS-SD name, e.g. `adbee-k3v9qa._adb-tls-pairing._tcp.local.`.
    pub fullname: Arc<str>,
    /// Uses `Arc<[IpAddr]>` for cheap cloning of immutable address lists.
    addresses: Arc<[IpAddr]>,
    pub port: u16,
}

impl DiscoveredService {
    /// Creates a new `DiscoveredService`.
    pub fn new(
        kind: ServiceKind,
        fullname: impl AsRef<str>,
        addresses: impl IntoIterator<Item = IpAddr>,
        port: u16,
    ) -> Self {
        let addrs: SmallVec<[IpAddr; INLINE_ADDRS]> = addresses.into_iter().collect();
        Self {
            kind,
            fullname: Arc::from(fullname.as_ref()),
            addresses: Arc::from(addrs.as_slice()),
            port,
        }
    }

    /// Returns the announced addresses.
    #[inline]
    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    /// The instance part of the full name (everything before the service type).
    pub fn instance_name(&self) -> &str {
        let suffix = self.kind.service_type();
        self.fullname
            .strip_suffix(suffix)
            .map(|s| s.trim_end_matches('.'))
            .unwrap_or(&self.fullname)
    }

    /// The first IPv4 address, falling back to any announced address.
    ///
    /// `adb` handles IPv4 reliably while link-local IPv6 needs a scope id
    /// that mDNS does not carry.
    pub fn preferred_address(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .copied()
            .find(IpAddr::is_ipv4)
            .or_else(|| self.addresses.first().copied())
    }

    /// The address `adb` should be pointed at.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.preferred_address()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

/// Events emitted by a browse stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// A service was resolved (or re-announced).
    Found(DiscoveredService),
    /// A service went away. Carries the full name.
    Removed(Arc<str>),
}

/// Thin wrapper over an `mdns-sd` daemon.
pub struct Discovery {
    daemon: ServiceDaemon,
}

impl Discovery {
    /// Starts the mDNS daemon.
    pub fn new() -> Result<Self, DiscoveryError> {
        let daemon =
            ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(Arc::from(e.to_string())))?;
        info!("mDNS daemon started");
        Ok(Self { daemon })
    }

    /// Starts browsing for `kind` and returns a stream of events.
    ///
    /// The forwarding task ends when the receiver is dropped or browsing is
    /// stopped with [`Discovery::stop_browse`].
    pub fn browse(&self, kind: ServiceKind) -> Result<mpsc::Receiver<ServiceEvent>, DiscoveryError> {
        let service_type = kind.service_type();
        let receiver = self
            .daemon
            .browse(service_type)
            .map_err(|e| DiscoveryError::Browse {
                service_type,
                reason: Arc::from(e.to_string()),
            })?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            debug!(service_type, "Browse task started");

            while let Ok(event) = receiver.recv_async().await {
                let forwarded = match event {
                    MdnsEvent::ServiceResolved(info) => {
                        let service = DiscoveredService::new(
                            kind,
                            info.get_fullname(),
                            info.get_addresses().iter().copied(),
                            info.get_port(),
                        );
                        debug!(
                            name = %service.fullname,
                            addresses = ?service.addresses(),
                            port = service.port,
                            "Service resolved"
                        );
                        ServiceEvent::Found(service)
                    }
                    MdnsEvent::ServiceRemoved(_, fullname) => {
                        debug!(name = %fullname, "Service removed");
                        ServiceEvent::Removed(Arc::from(fullname))
                    }
                    MdnsEvent::SearchStopped(_) => break,
                    _ => continue,
                };

                if tx.send(forwarded).await.is_err() {
                    break; // Receiver dropped
                }
            }

            debug!(service_type, "Browse task finished");
        });

        Ok(rx)
    }

    /// Stops browsing for `kind`. Errors are logged, not returned.
    pub fn stop_browse(&self, kind: ServiceKind) {
        if let Err(e) = self.daemon.stop_browse(kind.service_type()) {
            warn!(service_type = kind.service_type(), error = %e, "Failed to stop browsing");
        }
    }

    /// Shuts the daemon down.
    pub fn shutdown(&self) {
        if let Err(e) = self.daemon.shutdown() {
            warn!(error = %e, "Failed to shut down mDNS daemon");
        } else {
            info!("mDNS daemon stopped");
        }
    }
}
