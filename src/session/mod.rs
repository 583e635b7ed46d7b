//! Recording session management
//!
//! `RecordingSession` owns one complete streaming pipeline:
//! - audio capture and the processing graph (filters, gain, volume monitor)
//! - the continuous local recognizer and its interim workspace
//! - segment recording with silence/entitlement gates
//! - the upload coordinator merging server-confirmed text into the vault

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::RecordingSession;
pub use stats::{SessionAlert, SessionStats};
