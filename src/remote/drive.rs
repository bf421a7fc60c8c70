use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actuator::{Actuator, Direction};
use crate::error::{CameraError, PinError};
use crate::frame::DisplayFrame;
use crate::ingest::FrameSource;
use crate::remote::client::RemoteDetectClient;
use crate::stream::JpegEncoder;

const BACKOFF_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub enum DriveExit {
    Cancelled,
    CameraLost(CameraError),
    ActuatorLost(PinError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriveStats {
    pub frames: u64,
    pub decisions: u64,
    pub link_failures: u64,
}

/// Split-topology control loop: capture locally, decide remotely, drive
/// locally.
///
/// A failed round-trip stops the rover, waits out the backoff and tries
/// again with a fresh frame. Only losing the camera or the pins ends it.
pub struct RemoteDrive {
    source: Box<dyn FrameSource>,
    encoder: JpegEncoder,
    client: RemoteDetectClient,
    actuator: Arc<Actuator>,
    retry_backoff: Duration,
    cancel: Arc<AtomicBool>,
    stats: DriveStats,
}

impl RemoteDrive {
    pub fn new(
        source: Box<dyn FrameSource>,
        encoder: JpegEncoder,
        client: RemoteDetectClient,
        actuator: Arc<Actuator>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            source,
            encoder,
            client,
            actuator,
            retry_backoff,
            cancel: Arc::new(AtomicBool::new(false)),
            stats: DriveStats::default(),
        }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn stats(&self) -> DriveStats {
        self.stats
    }

    pub fn run(&mut self) -> DriveExit {
        log::info!(
            "remote drive: {} -> {} (timeout {} ms)",
            self.source.describe(),
            self.client.url(),
            self.client.timeout().as_millis()
        );
        let exit = loop {
            if self.cancel.load(Ordering::SeqCst) {
                break DriveExit::Cancelled;
            }
            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(err) => break DriveExit::CameraLost(err),
            };
            self.stats.frames += 1;

            let jpeg = match self.encoder.encode(&DisplayFrame::Raw(frame)) {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    log::warn!("remote drive: frame skipped, {:#}", err);
                    continue;
                }
            };

            let (direction, failed) = match self.client.decide(&jpeg) {
                Ok(decision) => {
                    log::info!(
                        "remote drive: {} ({} detections, {} ms)",
                        decision.action,
                        decision.detections.len(),
                        decision.latency.as_millis()
                    );
                    self.stats.decisions += 1;
                    (decision.action, false)
                }
                Err(err) => {
                    log::warn!("remote drive: link failed, stopping: {}", err);
                    self.stats.link_failures += 1;
                    (Direction::Stop, true)
                }
            };
            if let Err(err) = self.actuator.apply(direction) {
                // shutdown releases the pins under us
                if self.cancel.load(Ordering::SeqCst) {
                    break DriveExit::Cancelled;
                }
                break DriveExit::ActuatorLost(err);
            }
            if failed {
                self.backoff();
            }
        };

        if let Err(err) = self.actuator.apply(Direction::Stop) {
            log::debug!("remote drive: final stop skipped: {}", err);
        }
        log::info!("remote drive: ended ({:?}), {:?}", exit, self.stats);
        exit
    }

    fn backoff(&self) {
        let deadline = Instant::now() + self.retry_backoff;
        while Instant::now() < deadline && !self.cancel.load(Ordering::SeqCst) {
            std::thread::sleep(BACKOFF_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{MemoryPinBank, PinState};
    use crate::config::{CameraSettings, RemoteSettings};
    use crate::ingest::SyntheticSource;
    use std::net::TcpListener;

    fn source(frames: u64) -> Box<dyn FrameSource> {
        let settings = CameraSettings {
            device: format!("stub://drive?frames={}&fps=0", frames),
            width: 32,
            height: 24,
            buffer_depth: 1,
        };
        Box::new(SyntheticSource::open(&settings).unwrap())
    }

    #[test]
    fn unreachable_server_stops_and_retries_until_camera_ends() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let client = RemoteDetectClient::new(&RemoteSettings {
            url: format!("http://{}/detect", addr),
            timeout: Duration::from_millis(300),
            retry_backoff: Duration::from_millis(10),
        });
        let bank = MemoryPinBank::new();
        let probe = bank.probe();
        let actuator = Arc::new(Actuator::new(Box::new(bank)).unwrap());
        actuator.apply(Direction::Forward).unwrap();

        let mut drive = RemoteDrive::new(
            source(3),
            JpegEncoder::new(70),
            client,
            actuator.clone(),
            Duration::from_millis(10),
        );
        let exit = drive.run();

        assert!(matches!(exit, DriveExit::CameraLost(_)));
        assert_eq!(drive.stats().link_failures, 3);
        assert_eq!(drive.stats().decisions, 0);
        assert_eq!(actuator.pin_state(), PinState::INACTIVE);
        assert_eq!(probe.current(), PinState::INACTIVE);
    }
}
