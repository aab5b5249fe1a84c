//! Networking module for ADBee
//!
//! This module provides everything between "a QR code is on screen" and
//! "the device shows up in `adb devices`":
//!
//! - **Credentials**: per-attempt service name and pairing code, and the
//!   `WIFI:T:ADB;...` payload built from them
//! - **Discovery**: mDNS browsing for the phone's pairing and connect services
//! - **Adb**: async wrapper over `adb pair` / `adb connect`
//! - **Session**: one pairing attempt tying the three together
//!
//! # Example
//!
//! ```rust,ignore
//! use adbee::net::{AdbClient, Discovery, PairingCredentials, PairingSession, ServiceKind};
//!
//! let creds = PairingCredentials::generate("adbee");
//! let discovery = Discovery::new()?;
//! let (session, mut events) = PairingSession::start(
//!     creds,
//!     adb,
//!     settings,
//!     discovery.browse(ServiceKind::Pairing)?,
//!     discovery.browse(ServiceKind::Connect)?,
//! );
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod adb;
pub mod credentials;
pub mod discovery;
pub mod session;

pub use adb::{AdbClient, AdbError, AdbTimeouts};
pub use credentials::{PairingCredentials, PairingError};
pub use discovery::{DiscoveredService, Discovery, DiscoveryError, ServiceEvent, ServiceKind};
pub use session::{PairingSession, SessionEvent, SessionSettings, SessionState};
