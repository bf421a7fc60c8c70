use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::detect::DetectionOracle;
use crate::error::CameraError;
use crate::ingest::FrameSource;
use crate::scheduler::AdaptiveScheduler;
use crate::stream::encoder::{frame_chunk, JpegEncoder};
use crate::stream::hub::FrameHub;

const IDLE_POLL: Duration = Duration::from_millis(50);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Counters published by the streaming thread.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames: AtomicU64,
    ticks: AtomicU64,
    inferences: AtomicU64,
    inference_failures: AtomicU64,
    encode_failures: AtomicU64,
    chunks: AtomicU64,
    running: AtomicBool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub ticks: u64,
    pub inferences: u64,
    pub inference_failures: u64,
    pub encode_failures: u64,
    pub chunks: u64,
    pub running: bool,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            inferences: self.inferences.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
        }
    }
}

/// Why the streaming loop returned.
#[derive(Debug)]
pub enum PipelineExit {
    Cancelled,
    CameraLost(CameraError),
}

/// Capture → schedule → encode → fan out, on one thread.
///
/// The source, oracle and annotated cache are owned here and never shared.
/// While no viewer is connected the loop idles without capturing, so the
/// tick counter only advances for frames someone is watching.
pub struct StreamPipeline {
    source: Box<dyn FrameSource>,
    oracle: Box<dyn DetectionOracle>,
    scheduler: AdaptiveScheduler,
    encoder: JpegEncoder,
    hub: FrameHub,
    cancel: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
}

impl StreamPipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        oracle: Box<dyn DetectionOracle>,
        scheduler: AdaptiveScheduler,
        encoder: JpegEncoder,
        hub: FrameHub,
    ) -> Self {
        Self {
            source,
            oracle,
            scheduler,
            encoder,
            hub,
            cancel: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Flag that stops the loop at the next tick boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Process one frame if anyone is watching. Returns `Ok(false)` when idle.
    pub fn step(&mut self) -> Result<bool, CameraError> {
        if self.hub.viewer_count() == 0 {
            return Ok(false);
        }

        let frame = self.source.next_frame()?;
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        // a viewer may have left or shutdown begun during a blocking read
        if self.cancel.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let display = self.scheduler.process(frame, self.oracle.as_mut());
        self.stats.ticks.store(self.scheduler.ticks(), Ordering::Relaxed);
        self.stats
            .inferences
            .store(self.scheduler.inferences(), Ordering::Relaxed);
        self.stats
            .inference_failures
            .store(self.scheduler.failures(), Ordering::Relaxed);

        match self.encoder.encode(&display) {
            Ok(jpeg) => {
                self.hub.publish(Arc::new(frame_chunk(&jpeg)));
                self.stats.chunks.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.encode_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("frame {}: skipped, {:#}", display.frame().seq, err);
            }
        }
        Ok(true)
    }

    /// Run until cancelled or the camera goes away.
    pub fn run(mut self) -> PipelineExit {
        log::info!(
            "stream: {} via {} (skip {}, reuse {}, jpeg quality {})",
            self.source.describe(),
            self.oracle.name(),
            self.scheduler.skip(),
            self.scheduler.policy(),
            self.encoder.quality()
        );
        self.stats.running.store(true, Ordering::SeqCst);
        let mut last_health_log = Instant::now();

        let exit = loop {
            if self.cancel.load(Ordering::SeqCst) {
                break PipelineExit::Cancelled;
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) => std::thread::sleep(IDLE_POLL),
                Err(err) => {
                    log::error!("stream: camera lost: {}", err);
                    break PipelineExit::CameraLost(err);
                }
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.stats.snapshot();
                log::info!(
                    "stream health: frames={} inferences={} failures={} viewers={} dropped={}",
                    stats.frames,
                    stats.inferences,
                    stats.inference_failures,
                    self.hub.viewer_count(),
                    self.hub.dropped()
                );
                last_health_log = Instant::now();
            }
        };

        self.stats.running.store(false, Ordering::SeqCst);
        self.hub.close();
        log::info!(
            "stream: stopped after {} frames ({:?})",
            self.source.frames_captured(),
            exit
        );
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraSettings;
    use crate::detect::StubOracle;
    use crate::ingest::SyntheticSource;
    use crate::scheduler::ReusePolicy;
    use crate::stream::hub::Recv;

    fn pipeline(device: &str, hub: &FrameHub) -> StreamPipeline {
        let settings = CameraSettings {
            device: device.to_string(),
            width: 32,
            height: 24,
            buffer_depth: 1,
        };
        StreamPipeline::new(
            Box::new(SyntheticSource::open(&settings).unwrap()),
            Box::new(StubOracle::new()),
            AdaptiveScheduler::new(1, ReusePolicy::Raw),
            JpegEncoder::new(80),
            hub.clone(),
        )
    }

    #[test]
    fn idles_without_viewers() {
        let hub = FrameHub::new();
        let mut pipeline = pipeline("stub://idle?fps=0", &hub);
        assert!(!pipeline.step().unwrap());
        assert_eq!(pipeline.stats().snapshot().ticks, 0);
    }

    #[test]
    fn publishes_chunks_to_viewers() {
        let hub = FrameHub::new();
        let viewer = hub.subscribe();
        let mut pipeline = pipeline("stub://cam?fps=0", &hub);

        assert!(pipeline.step().unwrap());
        match viewer.recv_timeout(Duration::from_millis(100)) {
            Recv::Chunk(chunk) => assert!(chunk.starts_with(b"--frame\r\n")),
            other => panic!("expected chunk, got {:?}", other),
        }
        let stats = pipeline.stats().snapshot();
        assert_eq!((stats.ticks, stats.inferences, stats.chunks), (1, 1, 1));
    }

    #[test]
    fn camera_loss_ends_run() {
        let hub = FrameHub::new();
        let viewer = hub.subscribe();
        let pipeline = pipeline("stub://cam?frames=3&fps=0", &hub);
        let stats = pipeline.stats();

        let exit = pipeline.run();
        assert!(matches!(exit, PipelineExit::CameraLost(_)));
        assert_eq!(stats.snapshot().frames, 3);
        assert!(!stats.snapshot().running);
        // hub is closed once the stream ends
        let mut saw_closed = false;
        for _ in 0..5 {
            if viewer.recv_timeout(Duration::from_millis(10)) == Recv::Closed {
                saw_closed = true;
                break;
            }
        }
        assert!(saw_closed);
    }

    #[test]
    fn cancel_flag_stops_run() {
        let hub = FrameHub::new();
        let pipeline = pipeline("stub://cam?fps=0", &hub);
        pipeline.cancel_flag().store(true, Ordering::SeqCst);
        assert!(matches!(pipeline.run(), PipelineExit::Cancelled));
    }
}
