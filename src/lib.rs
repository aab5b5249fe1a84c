//! ADBee - pair Android devices for wireless debugging with a QR code
//!
//! The host shows a QR code; the phone scans it from
//! *Developer options → Wireless debugging → Pair device with QR code*;
//! ADBee notices the phone over mDNS and runs `adb pair` and `adb connect`
//! on the user's behalf.
//!
//! # Architecture
//!
//! - [`config`]: Defaults, environment overrides and adb lookup
//! - [`qr`]: QR matrix generation (via the `qrcode` crate)
//! - [`net`]: Credentials, mDNS discovery, adb invocation and the pairing session
//! - [`app`]: Shared state between the networking thread and the UI
//! - [`ui`]: User interface components built with GPUI
//!
//! # Example
//!
//! ```rust,ignore
//! use adbee::net::PairingCredentials;
//! use adbee::qr::QrMatrix;
//!
//! let creds = PairingCredentials::generate("adbee");
//! let qr = QrMatrix::encode(&creds.qr_payload())?;
//! print!("{}", qr.to_terminal_string());
//! ```

pub mod app;
pub mod config;
pub mod net;
pub mod qr;
pub mod ui;

pub use app::AppState;
pub use config::Config;
