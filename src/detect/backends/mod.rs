pub mod motion;
pub mod stub;

#[cfg(feature = "backend-tract")]
mod coco;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use motion::MotionOracle;
pub use stub::StubOracle;

#[cfg(feature = "backend-tract")]
pub use tract::TractOracle;
