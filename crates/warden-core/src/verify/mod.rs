//! Integrity verification and the download gate

mod gate;
mod verifier;

pub use gate::{DownloadGate, DownloadTicket};
pub use verifier::{Checked, IntegrityOutcome, IntegrityVerifier, Observation};
