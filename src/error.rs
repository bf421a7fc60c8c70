//! Typed errors for the hardware and transport boundaries.
//!
//! Everything above these boundaries uses `anyhow`; these types exist where a
//! caller has to branch on the failure kind (camera gone vs. open failure,
//! remote timeout vs. bad status).

use thiserror::Error;

/// Camera device failures.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device could not be opened or configured. Fatal at startup.
    #[error("failed to open camera {device}: {reason}")]
    Open { device: String, reason: String },
    /// End-of-stream or a read error. The device is not self-healing, so the
    /// stream that owns it terminates.
    #[error("camera disconnected: {0}")]
    Disconnected(String),
}

/// GPIO pin bank failures.
#[derive(Debug, Error)]
pub enum PinError {
    #[error("gpio pin bank unavailable: {0}")]
    Unavailable(String),
    #[error("invalid pin assignment: {0}")]
    InvalidAssignment(String),
    #[error("pin bank already released")]
    Released,
}

/// Failures of the remote detection round-trip.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote detection timed out")]
    Timeout,
    #[error("remote detection returned status {0}")]
    Status(u16),
    #[error("remote detection transport error: {0}")]
    Transport(String),
    #[error("malformed remote detection response: {0}")]
    Malformed(String),
}
