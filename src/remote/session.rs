//! Hardware ownership for the split-topology rover.
//!
//! `RemoteSession` holds the pins and camera the same way `Lifecycle` does
//! for the streaming rover: resource tokens, a camera lease and a shutdown
//! that runs once. The drive loop gets its own thread so a camera read that
//! never returns cannot keep the motors running after shutdown.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::actuator::{open_pin_bank, Actuator, Direction};
use crate::config::RoverConfig;
use crate::ingest::{open_source, FrameSource};
use crate::lifecycle::{join_within, lock, CameraLease, ResourceReport, ResourceToken};
use crate::remote::client::RemoteDetectClient;
use crate::remote::drive::{DriveExit, DriveStats, RemoteDrive};
use crate::stream::JpegEncoder;

type DriveOutcome = (DriveExit, DriveStats);

pub struct RemoteSession {
    actuator: Arc<Actuator>,
    pins: Arc<ResourceToken>,
    camera: Arc<ResourceToken>,
    cancel: Arc<AtomicBool>,
    drive: Mutex<Option<JoinHandle<DriveOutcome>>>,
    outcome: Mutex<Option<DriveOutcome>>,
    shutdown_timeout: Duration,
    shutdown: Once,
}

impl RemoteSession {
    /// Acquire pins → camera from configuration and start driving.
    pub fn acquire(config: &RoverConfig) -> Result<Self> {
        let bank = open_pin_bank(&config.pins).context("acquire pin bank")?;
        let actuator = Actuator::new(bank).context("initialise pin bank")?;
        let source = match open_source(&config.camera) {
            Ok(source) => source,
            Err(err) => {
                if let Err(release_err) = actuator.release() {
                    log::error!("remote session: pin release failed: {}", release_err);
                }
                return Err(err).context("acquire camera");
            }
        };
        Self::start(config, actuator, source)
    }

    /// Start the drive loop over already-open hardware.
    pub fn start(
        config: &RoverConfig,
        actuator: Actuator,
        source: Box<dyn FrameSource>,
    ) -> Result<Self> {
        let pins = Arc::new(ResourceToken::new("pins"));
        pins.acquire()?;
        let camera = Arc::new(ResourceToken::new("camera"));
        let lease = CameraLease::new(source, camera.clone())?;
        let actuator = Arc::new(actuator);

        let mut drive = RemoteDrive::new(
            Box::new(lease),
            JpegEncoder::new(config.stream.jpeg_quality),
            RemoteDetectClient::new(&config.remote),
            actuator.clone(),
            config.remote.retry_backoff,
        );
        let cancel = drive.cancel_flag();
        let spawned = std::thread::Builder::new()
            .name("remote-drive".to_string())
            .spawn(move || {
                let exit = drive.run();
                (exit, drive.stats())
            });
        let join = match spawned {
            Ok(join) => join,
            Err(err) => {
                if let Err(release_err) = actuator.release() {
                    log::error!("remote session: pin release failed: {}", release_err);
                }
                pins.release();
                return Err(err).context("spawn remote drive thread");
            }
        };

        Ok(Self {
            actuator,
            pins,
            camera,
            cancel,
            drive: Mutex::new(Some(join)),
            outcome: Mutex::new(None),
            shutdown_timeout: config.shutdown_timeout,
            shutdown: Once::new(),
        })
    }

    pub fn actuator(&self) -> &Arc<Actuator> {
        &self.actuator
    }

    pub fn resources(&self) -> ResourceReport {
        ResourceReport {
            pins: self.pins.state(),
            camera: self.camera.state(),
        }
    }

    /// True once the drive loop has returned on its own (or been joined).
    pub fn is_finished(&self) -> bool {
        lock(&self.drive)
            .as_ref()
            .map_or(true, |join| join.is_finished())
    }

    /// Why the drive loop ended, once shutdown has joined it.
    pub fn take_outcome(&self) -> Option<(DriveExit, DriveStats)> {
        lock(&self.outcome).take()
    }

    /// Stop, release the pins, then the camera. Runs once.
    pub fn shutdown(&self) {
        self.shutdown.call_once(|| self.shutdown_inner());
    }

    fn shutdown_inner(&self) {
        log::info!("remote session: shutting down");
        self.cancel.store(true, Ordering::SeqCst);

        match self.actuator.apply(Direction::Stop) {
            Ok(_) => log::info!("remote session: motors stopped"),
            Err(err) => log::warn!("remote session: stop before release failed: {}", err),
        }
        if let Err(err) = self.actuator.release() {
            log::error!("remote session: pin release failed: {}", err);
        }
        if self.pins.release() {
            log::info!("remote session: pins released");
        }

        let join = lock(&self.drive).take();
        if let Some(join) = join {
            match join_within(join, self.shutdown_timeout) {
                Some(Ok(outcome)) => *lock(&self.outcome) = Some(outcome),
                Some(Err(_)) => log::error!("remote session: drive thread panicked"),
                None => log::warn!(
                    "remote session: drive thread still blocked after {} ms",
                    self.shutdown_timeout.as_millis()
                ),
            }
        }

        if self.camera.release() {
            log::warn!("remote session: camera released while a read was outstanding");
        }
        log::info!("remote session: shutdown complete");
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
