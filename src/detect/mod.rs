//! Object detection: the oracle seam, its backends, and what the rest of
//! the rover does with a result (annotation, avoidance).

mod annotate;
pub mod avoid;
pub mod backends;
mod oracle;
mod registry;
mod result;
mod worker;

pub use avoid::AvoidancePolicy;
pub use backends::{MotionOracle, StubOracle};
#[cfg(feature = "backend-tract")]
pub use backends::TractOracle;
pub use oracle::{shared, DetectionOracle, SharedOracle};
pub use registry::open_oracle;
pub use result::{non_max_suppression, BoundingBox, Detection, DetectionResult};
pub use worker::WorkerOracle;
