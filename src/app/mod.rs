//! Application state and lifecycle management.

mod state;

pub use state::{ActivePairing, AppState, PairingStatus, Toast};
