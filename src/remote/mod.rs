//! Split topology: the rover uploads frames to a detection server and
//! drives on its answer.

pub mod client;
pub mod drive;
mod session;

pub use client::{RemoteDecision, RemoteDetectClient, RemoteDetection};
pub use drive::{DriveExit, DriveStats, RemoteDrive};
pub use session::RemoteSession;
