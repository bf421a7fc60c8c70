//! Ownership of the rover's hardware for the life of the process.
//!
//! `Lifecycle::acquire` takes the pins, then the camera, then the detector.
//! If any step fails, whatever was already taken is handed back before the
//! error is returned, so nothing is served on a half-built rover.
//!
//! `shutdown` runs once no matter how many threads call it (signal handler,
//! error path, `Drop`): cancel the stream, stop the motors, release the pins,
//! release the camera. A stream thread stuck in a camera read gets
//! `shutdown_timeout` to return; after that the camera token is released
//! anyway and the device closes whenever the read comes back.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::actuator::{open_pin_bank, Actuator, Direction};
use crate::api::ControlState;
use crate::config::RoverConfig;
use crate::detect::{open_oracle, DetectionOracle};
use crate::error::CameraError;
use crate::frame::Frame;
use crate::gateway::CommandGateway;
use crate::ingest::{open_source, FrameSource};
use crate::scheduler::AdaptiveScheduler;
use crate::stream::{FrameHub, JpegEncoder, PipelineExit, PipelineStats, StreamPipeline};

const JOIN_POLL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    Uninitialized,
    Acquired,
    Released,
}

impl TokenState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Acquired,
            2 => Self::Released,
            _ => Self::Uninitialized,
        }
    }
}

/// Uninitialized → Acquired → Released, each edge taken at most once.
#[derive(Debug)]
pub struct ResourceToken {
    name: &'static str,
    state: AtomicU8,
}

impl ResourceToken {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: AtomicU8::new(TokenState::Uninitialized as u8),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> TokenState {
        TokenState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn acquire(&self) -> Result<()> {
        self.state
            .compare_exchange(
                TokenState::Uninitialized as u8,
                TokenState::Acquired as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|current| {
                anyhow!(
                    "{} cannot be acquired from state {:?}",
                    self.name,
                    TokenState::from_u8(current)
                )
            })
    }

    /// True only for the call that moved the token to `Released`.
    pub fn release(&self) -> bool {
        self.state
            .compare_exchange(
                TokenState::Acquired as u8,
                TokenState::Released as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// A frame source tied to the camera token; dropping it releases the token.
pub struct CameraLease {
    source: Box<dyn FrameSource>,
    token: Arc<ResourceToken>,
}

impl CameraLease {
    pub fn new(source: Box<dyn FrameSource>, token: Arc<ResourceToken>) -> Result<Self> {
        token.acquire()?;
        Ok(Self { source, token })
    }
}

impl FrameSource for CameraLease {
    fn describe(&self) -> String {
        self.source.describe()
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if self.token.state() == TokenState::Released {
            return Err(CameraError::Disconnected(format!(
                "{} released",
                self.source.describe()
            )));
        }
        self.source.next_frame()
    }

    fn frames_captured(&self) -> u64 {
        self.source.frames_captured()
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        if self.token.release() {
            log::info!("lifecycle: camera {} released", self.source.describe());
        }
    }
}

/// Snapshot of the two hardware tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    pub pins: TokenState,
    pub camera: TokenState,
}

pub struct Lifecycle {
    config: RoverConfig,
    actuator: Arc<Actuator>,
    pins: Arc<ResourceToken>,
    camera: Arc<ResourceToken>,
    hub: FrameHub,
    stats: Arc<PipelineStats>,
    cancel: Arc<AtomicBool>,
    pending: Mutex<Option<StreamPipeline>>,
    stream: Mutex<Option<JoinHandle<PipelineExit>>>,
    shutdown: Once,
}

impl Lifecycle {
    /// Acquire pins → camera → detector from configuration.
    pub fn acquire(config: &RoverConfig) -> Result<Self> {
        let bank = open_pin_bank(&config.pins).context("acquire pin bank")?;
        let actuator = Actuator::new(bank).context("initialise pin bank")?;
        log::info!("lifecycle: pins {:?} acquired", config.pins.assignment.lines());

        let source = match open_source(&config.camera) {
            Ok(source) => source,
            Err(err) => {
                abort_pins(&actuator);
                return Err(err).context("acquire camera");
            }
        };
        log::info!("lifecycle: camera {} acquired", source.describe());

        let oracle = match open_oracle(&config.detector) {
            Ok(oracle) => oracle,
            Err(err) => {
                log::info!("lifecycle: releasing camera {}", source.describe());
                drop(source);
                abort_pins(&actuator);
                return Err(err).context("acquire detector");
            }
        };

        Self::assemble(config.clone(), actuator, source, oracle)
    }

    /// Build a lifecycle around already-open components.
    pub fn assemble(
        config: RoverConfig,
        actuator: Actuator,
        source: Box<dyn FrameSource>,
        oracle: Box<dyn DetectionOracle>,
    ) -> Result<Self> {
        let pins = Arc::new(ResourceToken::new("pins"));
        pins.acquire()?;
        let camera = Arc::new(ResourceToken::new("camera"));
        let lease = CameraLease::new(source, camera.clone())?;

        let hub = FrameHub::new();
        let pipeline = StreamPipeline::new(
            Box::new(lease),
            oracle,
            AdaptiveScheduler::new(config.scheduler.skip_frames, config.scheduler.reuse),
            JpegEncoder::new(config.stream.jpeg_quality),
            hub.clone(),
        );

        Ok(Self {
            actuator: Arc::new(actuator),
            pins,
            camera,
            hub,
            stats: pipeline.stats(),
            cancel: pipeline.cancel_flag(),
            pending: Mutex::new(Some(pipeline)),
            stream: Mutex::new(None),
            shutdown: Once::new(),
            config,
        })
    }

    /// Start the streaming thread. Valid once, before shutdown.
    pub fn start_stream(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(anyhow!("lifecycle already shut down"));
        }
        let pipeline = lock(&self.pending)
            .take()
            .ok_or_else(|| anyhow!("stream already started"))?;
        let join = std::thread::Builder::new()
            .name("stream".to_string())
            .spawn(move || pipeline.run())?;
        *lock(&self.stream) = Some(join);
        Ok(())
    }

    pub fn actuator(&self) -> &Arc<Actuator> {
        &self.actuator
    }

    pub fn hub(&self) -> &FrameHub {
        &self.hub
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn config(&self) -> &RoverConfig {
        &self.config
    }

    pub fn control_state(&self) -> ControlState {
        ControlState {
            gateway: CommandGateway::new(self.actuator.clone()),
            hub: self.hub.clone(),
            stats: self.stats.clone(),
            write_timeout: self.config.stream.write_timeout,
        }
    }

    pub fn resources(&self) -> ResourceReport {
        ResourceReport {
            pins: self.pins.state(),
            camera: self.camera.state(),
        }
    }

    /// Release everything. Safe to call from any thread, any number of times.
    pub fn shutdown(&self) {
        self.shutdown.call_once(|| self.shutdown_inner());
    }

    fn shutdown_inner(&self) {
        log::info!("lifecycle: shutting down");
        self.cancel.store(true, Ordering::SeqCst);
        self.hub.close();

        match self.actuator.apply(Direction::Stop) {
            Ok(_) => log::info!("lifecycle: motors stopped"),
            Err(err) => log::warn!("lifecycle: stop before release failed: {}", err),
        }
        if let Err(err) = self.actuator.release() {
            log::error!("lifecycle: pin release failed: {}", err);
        }
        if self.pins.release() {
            log::info!("lifecycle: pins released");
        }

        // never started: dropping the pipeline drops the camera lease
        drop(lock(&self.pending).take());

        let join = lock(&self.stream).take();
        if let Some(join) = join {
            match join_within(join, self.config.shutdown_timeout) {
                Some(Ok(exit)) => log::info!("lifecycle: stream thread exited ({:?})", exit),
                Some(Err(_)) => log::error!("lifecycle: stream thread panicked"),
                None => log::warn!(
                    "lifecycle: stream thread still blocked after {} ms",
                    self.config.shutdown_timeout.as_millis()
                ),
            }
        }

        if self.camera.release() {
            log::warn!("lifecycle: camera released while a read was outstanding");
        }
        log::info!("lifecycle: shutdown complete");
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn abort_pins(actuator: &Actuator) {
    log::info!("lifecycle: releasing pins after failed startup");
    if let Err(err) = actuator.release() {
        log::error!("lifecycle: pin release failed: {}", err);
    }
}

/// Join `join` if it finishes within `timeout`. `None` leaves the thread
/// detached.
pub(crate) fn join_within<T>(
    join: JoinHandle<T>,
    timeout: Duration,
) -> Option<std::thread::Result<T>> {
    let deadline = Instant::now() + timeout;
    while !join.is_finished() && Instant::now() < deadline {
        std::thread::sleep(JOIN_POLL);
    }
    if join.is_finished() {
        Some(join.join())
    } else {
        None
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
