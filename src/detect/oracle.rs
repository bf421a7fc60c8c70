use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Object detector seam.
///
/// `infer` is synchronous and usually the slowest call in the process.
/// It takes `&mut self`: one instance is never entered concurrently, and
/// backends need not be reentrant. Sharing across threads goes through
/// `SharedOracle`, which serializes calls.
pub trait DetectionOracle: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn infer(&mut self, frame: &Frame) -> Result<DetectionResult>;

    /// Optional warm-up hook, run once at acquisition.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An oracle shared between request handlers, one inference at a time.
pub type SharedOracle = Arc<Mutex<Box<dyn DetectionOracle>>>;

pub fn shared(oracle: Box<dyn DetectionOracle>) -> SharedOracle {
    Arc::new(Mutex::new(oracle))
}
