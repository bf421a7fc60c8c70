//! Frame sources.
//!
//! - Synthetic source (`stub://` devices) for tests and bench runs
//! - V4L2 devices (feature: ingest-v4l2)
//!
//! Every source hands out complete `Frame`s or an error. A buffer that does
//! not decode is skipped (a few in a row at most); a read failure on a real
//! device is reported as `CameraError::Disconnected` and the owner of the
//! source stops its stream instead of retrying.

mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use crate::config::CameraSettings;
use crate::error::CameraError;
use crate::frame::Frame;

/// Consecutive undecodable frames tolerated before the device counts as lost.
pub const MAX_CORRUPT_FRAMES: u32 = 5;

/// One raw read from a device.
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
pub(crate) enum Grab {
    Frame(Frame),
    /// The driver handed back a buffer that does not decode to a frame.
    Corrupt(String),
}

/// Read until a frame decodes, skipping up to `MAX_CORRUPT_FRAMES` corrupt
/// buffers in a row. Read errors are returned as they are.
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
pub(crate) fn skip_corrupt<F>(device: &str, mut read: F) -> Result<Frame, CameraError>
where
    F: FnMut() -> Result<Grab, CameraError>,
{
    let mut corrupt = 0;
    loop {
        match read()? {
            Grab::Frame(frame) => return Ok(frame),
            Grab::Corrupt(reason) => {
                corrupt += 1;
                log::warn!("{}: corrupt frame skipped ({})", device, reason);
                if corrupt >= MAX_CORRUPT_FRAMES {
                    return Err(CameraError::Disconnected(format!(
                        "{}: {} corrupt frames in a row, last: {}",
                        device, corrupt, reason
                    )));
                }
            }
        }
    }
}

/// Pull-based camera interface.
pub trait FrameSource: Send {
    /// Device identifier for logs.
    fn describe(&self) -> String;

    /// Block until the next complete frame is available.
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Frames delivered so far.
    fn frames_captured(&self) -> u64;
}

/// Open the source named by `settings.device`.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>, CameraError> {
    if settings.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::open(settings)?));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::open(settings)?))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(CameraError::Open {
            device: settings.device.clone(),
            reason: "camera devices require the ingest-v4l2 feature".to_string(),
        })
    }
}
