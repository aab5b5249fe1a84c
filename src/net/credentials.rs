//! Pairing credentials and the QR payload built from them.
//!
//! Android's "Pair device with QR code" screen expects a Wi-Fi style payload:
//!
//! ```text
//! WIFI:T:ADB;S:<service name>;P:<pairing code>;;
//! ```
//!
//! After scanning, the phone advertises `_adb-tls-pairing._tcp` under the
//! service name from the payload and accepts the code as the pairing
//! password. Each attempt gets a fresh name and code, so a stale QR code on
//! another screen can never complete a newer session.
//!
//! # Example
//!
//! ```rust,ignore
//! let creds = PairingCredentials::generate("adbee");
//! let qr = QrMatrix::encode(&creds.qr_payload())?;
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;

/// Length of the random service name suffix.
const SUFFIX_LEN: usize = 6;

/// Range of the 6-digit pairing code.
const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

const PAYLOAD_PREFIX: &str = "WIFI:T:ADB;";

/// Errors that can occur while handling pairing credentials.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// The string is not an ADB `WIFI:` payload.
    #[error("not an ADB pairing payload")]
    InvalidPayload,

    /// The pairing code is not six digits.
    #[error("invalid pairing code")]
    InvalidCode,
}

/// Service name and one-time code for a single pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCredentials {
    service_name: String,
    code: u32,
    created_at: Instant,
}

impl PairingCredentials {
    /// Generates fresh credentials. The service name is `<prefix>-<suffix>`
    /// with a random lowercase alphanumeric suffix.
    pub fn generate(prefix: &str) -> Self {
        let mut rng = rand::thread_rng();

        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();

        Self {
            service_name: format!("{prefix}-{suffix}"),
            code: rng.gen_range(CODE_MIN..=CODE_MAX),
            created_at: Instant::now(),
        }
    }

    /// Builds credentials from known parts.
    pub fn new(service_name: impl Into<String>, code: &str) -> Result<Self, PairingError> {
        Ok(Self {
            service_name: service_name.into(),
            code: parse_code(code)?,
            created_at: Instant::now(),
        })
    }

    /// Parses a `WIFI:T:ADB;S:<name>;P:<code>;;` payload.
    pub fn parse_payload(payload: &str) -> Result<Self, PairingError> {
        let body = payload
            .strip_prefix(PAYLOAD_PREFIX)
            .and_then(|rest| rest.strip_suffix(";;"))
            .ok_or(PairingError::InvalidPayload)?;

        let mut service_name = None;
        let mut code = None;
        for field in body.split(';') {
            match field.split_once(':') {
                Some(("S", value)) if !value.is_empty() => service_name = Some(value),
                Some(("P", value)) => code = Some(value),
                _ => return Err(PairingError::InvalidPayload),
            }
        }

        match (service_name, code) {
            (Some(name), Some(code)) => Self::new(name, code),
            _ => Err(PairingError::InvalidPayload),
        }
    }

    /// The advertised service (instance) name.
    #[inline]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The pairing code as shown to the user.
    #[inline]
    pub fn code(&self) -> String {
        self.code.to_string()
    }

    /// Payload to encode into the QR code.
    pub fn qr_payload(&self) -> String {
        format!("{PAYLOAD_PREFIX}S:{};P:{};;", self.service_name, self.code)
    }

    /// Whether an mDNS full name such as
    /// `adbee-k3v9qa._adb-tls-pairing._tcp.local.` belongs to these credentials.
    pub fn matches_instance(&self, fullname: &str) -> bool {
        fullname
            .split_once('.')
            .is_some_and(|(instance, _)| instance == self.service_name)
    }

    /// Time since the credentials were generated.
    #[inline]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the credentials are older than `validity`.
    #[inline]
    pub fn is_expired(&self, validity: Duration) -> bool {
        self.age() > validity
    }
}

impl fmt::Display for PairingCredentials {
    /// Shows the service name only; the code stays out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_name)
    }
}

fn parse_code(code: &str) -> Result<u32, PairingError> {
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PairingError::InvalidCode);
    }
    code.parse::<u32>()
        .ok()
        .filter(|c| (CODE_MIN..=CODE_MAX).contains(c))
        .ok_or(PairingError::InvalidCode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_credentials_format() {
        let creds = PairingCredentials::generate("adbee");

        let (prefix, suffix) = creds.service_name().split_once('-').unwrap();
        assert_eq!(prefix, "adbee");
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        let code = creds.code();
        assert_eq!(code.len(), 6);
        let value: u32 = code.parse().unwrap();
        assert!((CODE_MIN..=CODE_MAX).contains(&value));
    }

    #[test]
    fn test_generated_credentials_are_unique_per_attempt() {
        let names: std::collections::HashSet<String> = (0..50)
            .map(|_| PairingCredentials::generate("adbee").service_name().to_string())
            .collect();
        assert_eq!(names.len(), 50);
    }

    #[test]
    fn test_qr_payload_format() {
        let creds = PairingCredentials::new("adbee-k3v9qa", "482913").unwrap();
        assert_eq!(creds.qr_payload(), "WIFI:T:ADB;S:adbee-k3v9qa;P:482913;;");
    }

    #[test]
    fn test_parse_payload() {
        let parsed =
            PairingCredentials::parse_payload("WIFI:T:ADB;S:studio-x1;P:123456;;").unwrap();
        assert_eq!(parsed.service_name(), "studio-x1");
        assert_eq!(parsed.code(), "123456");

        let generated = PairingCredentials::generate("adbee");
        let reparsed = PairingCredentials::parse_payload(&generated.qr_payload()).unwrap();
        assert_eq!(reparsed.service_name(), generated.service_name());
        assert_eq!(reparsed.code(), generated.code());
    }

    #[test]
    fn test_parse_payload_invalid() {
        for bad in [
            "",
            "WIFI:T:WPA;S:home;P:hunter22;;",
            "WIFI:T:ADB;S:adbee;P:123456;",
            "WIFI:T:ADB;S:;P:123456;;",
            "WIFI:T:ADB;P:123456;;",
            "WIFI:T:ADB;S:adbee;X:1;P:123456;;",
        ] {
            assert_eq!(
                PairingCredentials::parse_payload(bad),
                Err(PairingError::InvalidPayload),
                "payload {bad:?}"
            );
        }

        assert_eq!(
            PairingCredentials::parse_payload("WIFI:T:ADB;S:adbee;P:12ab56;;"),
            Err(PairingError::InvalidCode)
        );
        assert_eq!(
            PairingCredentials::parse_payload("WIFI:T:ADB;S:adbee;P:012345;;"),
            Err(PairingError::InvalidCode)
        );
    }

    #[test]
    fn test_matches_instance() {
        let creds = PairingCredentials::new("adbee-k3v9qa", "482913").unwrap();
        assert!(creds.matches_instance("adbee-k3v9qa._adb-tls-pairing._tcp.local."));
        assert!(!creds.matches_instance("adbee-zzzzzz._adb-tls-pairing._tcp.local."));
        assert!(!creds.matches_instance("adbee-k3v9qa-other._adb-tls-pairing._tcp.local."));
        assert!(!creds.matches_instance("adbee-k3v9qa"));
    }

    #[test]
    fn test_display_hides_code() {
        let creds = PairingCredentials::new("adbee-k3v9qa", "482913").unwrap();
        let shown = creds.to_string();
        assert_eq!(shown, "adbee-k3v9qa");
        assert!(!shown.contains("482913"));
    }

    #[test]
    fn test_expiry() {
        let creds = PairingCredentials::generate("adbee");
        assert!(!creds.is_expired(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(10));
        assert!(creds.is_expired(Duration::from_millis(1)));
    }
}
