//! MJPEG streaming: encoding, viewer fan-out and the capture loop.

pub mod encoder;
pub mod hub;
pub mod pipeline;

pub use encoder::{frame_chunk, JpegEncoder, BOUNDARY};
pub use hub::{Chunk, FrameHub, Recv, Subscription};
pub use pipeline::{PipelineExit, PipelineStats, StatsSnapshot, StreamPipeline};
