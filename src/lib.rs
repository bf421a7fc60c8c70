//! rover-pilot: camera-guided drive control for a two-motor rover.
//!
//! The rover streams its camera over HTTP as MJPEG, overlaying object
//! detections on a configurable subset of frames, and accepts drive
//! commands from the same server. A split topology moves detection to a
//! remote host, with the rover falling back to Stop whenever that link
//! fails.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (synthetic, V4L2)
//! - `detect`: detection oracle, backends, annotation and avoidance
//! - `scheduler`: which ticks run inference and what the others show
//! - `stream`: JPEG encoding, viewer fan-out, the capture loop
//! - `actuator`: direction → pin state machine over a pin bank
//! - `gateway`: command tokens → actuator transitions
//! - `api`: control and detection HTTP servers
//! - `remote`: client side of the split topology
//! - `lifecycle`: acquisition and exactly-once release of the hardware

pub mod actuator;
pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod ingest;
pub mod lifecycle;
pub mod remote;
pub mod scheduler;
pub mod stream;

pub use actuator::{Actuator, Direction, MemoryPinBank, PinBank, PinProbe, PinState};
pub use api::{ControlHandle, ControlServer, ControlState, DetectServer, ServerHandle};
pub use config::RoverConfig;
pub use detect::{open_oracle, DetectionOracle, DetectionResult};
pub use error::{CameraError, PinError, RemoteError};
pub use frame::{DisplayFrame, Frame};
pub use gateway::{CommandGateway, CommandOutcome};
pub use ingest::{open_source, FrameSource};
pub use lifecycle::{Lifecycle, ResourceToken, TokenState};
pub use remote::{RemoteDetectClient, RemoteDrive, RemoteSession};
pub use scheduler::{AdaptiveScheduler, ReusePolicy, TickOutcome};
pub use stream::{FrameHub, JpegEncoder, StreamPipeline};
