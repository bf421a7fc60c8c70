use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rover_pilot::detect::StubOracle;
use rover_pilot::lifecycle::ResourceReport;
use rover_pilot::stream::Recv;
use rover_pilot::{
    Actuator, CameraError, Direction, Frame, FrameSource, Lifecycle, MemoryPinBank, PinProbe,
    PinState, RoverConfig, TokenState,
};

/// A camera whose reads block until the test opens the gate.
#[derive(Clone, Default)]
struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
    reads: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl Gate {
    fn open(&self) {
        let (lock, cvar) = &*self.state;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait_for_read(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.reads.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "stream never read the camera");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

struct BlockingSource(Gate);

impl FrameSource for BlockingSource {
    fn describe(&self) -> String {
        "blocking://camera".to_string()
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.0.reads.fetch_add(1, Ordering::SeqCst);
        let (lock, cvar) = &*self.0.state;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
        Err(CameraError::Disconnected("gate opened".to_string()))
    }

    fn frames_captured(&self) -> u64 {
        0
    }
}

impl Drop for BlockingSource {
    fn drop(&mut self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

fn config() -> RoverConfig {
    let mut cfg = RoverConfig::default();
    cfg.camera.device = "stub://lifecycle?fps=0".to_string();
    cfg.camera.width = 32;
    cfg.camera.height = 24;
    cfg.shutdown_timeout = Duration::from_millis(200);
    cfg
}

fn blocking_rover(gate: &Gate) -> Result<(Lifecycle, PinProbe)> {
    let bank = MemoryPinBank::new();
    let probe = bank.probe();
    let lifecycle = Lifecycle::assemble(
        config(),
        Actuator::new(Box::new(bank))?,
        Box::new(BlockingSource(gate.clone())),
        Box::new(StubOracle::new()),
    )?;
    Ok((lifecycle, probe))
}

const ALL_RELEASED: ResourceReport = ResourceReport {
    pins: TokenState::Released,
    camera: TokenState::Released,
};

#[test]
fn shutdown_during_blocked_read_releases_everything_once() -> Result<()> {
    let gate = Gate::default();
    let (lifecycle, probe) = blocking_rover(&gate)?;
    let _viewer = lifecycle.hub().subscribe();
    lifecycle.actuator().apply(Direction::Forward)?;
    lifecycle.start_stream()?;
    gate.wait_for_read();

    let started = Instant::now();
    lifecycle.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(lifecycle.resources(), ALL_RELEASED);
    assert_eq!(probe.current(), PinState::INACTIVE);
    assert_eq!(probe.release_count(), 1);
    assert_eq!(lifecycle.actuator().current(), Direction::Stop);
    assert!(!gate.closed.load(Ordering::SeqCst));

    // the read returns later; the device closes then, without a second release
    gate.open();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !gate.closed.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "camera never closed");
        std::thread::sleep(Duration::from_millis(5));
    }
    lifecycle.shutdown();
    assert_eq!(probe.release_count(), 1);
    assert_eq!(lifecycle.resources(), ALL_RELEASED);
    Ok(())
}

#[test]
fn concurrent_shutdown_releases_once() -> Result<()> {
    let gate = Gate::default();
    let (lifecycle, probe) = blocking_rover(&gate)?;
    let lifecycle = Arc::new(lifecycle);
    lifecycle.start_stream()?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lifecycle = lifecycle.clone();
            std::thread::spawn(move || lifecycle.shutdown())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    gate.open();

    assert_eq!(probe.release_count(), 1);
    assert_eq!(lifecycle.resources(), ALL_RELEASED);
    assert!(lifecycle.actuator().apply(Direction::Forward).is_err());
    assert_eq!(probe.current(), PinState::INACTIVE);
    Ok(())
}

#[test]
fn shutdown_before_stream_start_closes_camera() -> Result<()> {
    let gate = Gate::default();
    let (lifecycle, probe) = blocking_rover(&gate)?;
    assert_eq!(lifecycle.resources().camera, TokenState::Acquired);
    assert_eq!(lifecycle.resources().pins, TokenState::Acquired);

    drop(lifecycle);
    assert!(gate.closed.load(Ordering::SeqCst));
    assert_eq!(probe.release_count(), 1);
    Ok(())
}

#[test]
fn acquire_streams_from_configuration() -> Result<()> {
    let mut cfg = config();
    cfg.detector.model = "stub".to_string();
    cfg.scheduler.skip_frames = 0;
    let lifecycle = Lifecycle::acquire(&cfg)?;
    let viewer = lifecycle.hub().subscribe();
    lifecycle.start_stream()?;
    assert!(lifecycle.start_stream().is_err());

    match viewer.recv_timeout(Duration::from_secs(5)) {
        Recv::Chunk(chunk) => assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg")),
        other => panic!("expected a chunk, got {:?}", other),
    }
    drop(viewer);
    lifecycle.shutdown();
    assert_eq!(lifecycle.resources(), ALL_RELEASED);
    assert!(lifecycle.stats().snapshot().inferences >= 1);
    Ok(())
}

#[test]
fn acquire_fails_before_serving_on_bad_camera_or_model() {
    let mut cfg = config();
    cfg.camera.device = "/dev/video-missing".to_string();
    let err = Lifecycle::acquire(&cfg).err().expect("camera should fail");
    assert!(format!("{:#}", err).contains("acquire camera"));

    let mut cfg = config();
    cfg.detector.model = "no-such-model".to_string();
    let err = Lifecycle::acquire(&cfg).err().expect("model should fail");
    assert!(format!("{:#}", err).contains("acquire detector"));
}
