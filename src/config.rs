use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::actuator::{PinAssignment, PinBackendKind};
use crate::scheduler::ReusePolicy;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 320;
const DEFAULT_CAMERA_HEIGHT: u32 = 240;
const DEFAULT_BUFFER_DEPTH: u32 = 1;
const DEFAULT_SKIP_FRAMES: u32 = 3;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_PINS: [u8; 4] = [17, 27, 22, 5];
const DEFAULT_MODEL: &str = "motion";
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 1_500;
const DEFAULT_DETECT_URL: &str = "http://127.0.0.1:8000/detect";
const DEFAULT_DETECT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Deserialize, Default)]
struct RoverConfigFile {
    listen_addr: Option<String>,
    camera: Option<CameraConfigFile>,
    scheduler: Option<SchedulerConfigFile>,
    stream: Option<StreamConfigFile>,
    pins: Option<PinConfigFile>,
    detector: Option<DetectorConfigFile>,
    remote: Option<RemoteConfigFile>,
    shutdown_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    buffer_depth: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerConfigFile {
    skip_frames: Option<u32>,
    reuse: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
    write_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PinConfigFile {
    lines: Option<Vec<u8>>,
    backend: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model: Option<String>,
    offload: Option<bool>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RemoteConfigFile {
    url: Option<String>,
    timeout_ms: Option<u64>,
    retry_backoff_ms: Option<u64>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct RoverConfig {
    pub listen_addr: String,
    pub camera: CameraSettings,
    pub scheduler: SchedulerSettings,
    pub stream: StreamSettings,
    pub pins: PinSettings,
    pub detector: DetectorSettings,
    pub remote: RemoteSettings,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://name` for the synthetic source, otherwise a V4L2 device path.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Driver buffer count. Smaller trades smoothness for latency.
    pub buffer_depth: u32,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub skip_frames: u32,
    pub reuse: ReusePolicy,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
    pub write_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PinSettings {
    pub assignment: PinAssignment,
    pub backend: PinBackendKind,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `stub`, `motion`, or a path to an ONNX model.
    pub model: String,
    /// Run inference on a dedicated worker thread.
    pub offload: bool,
    /// Upper bound on one offloaded inference.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub url: String,
    pub timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            camera: CameraSettings {
                device: DEFAULT_CAMERA_DEVICE.to_string(),
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
                buffer_depth: DEFAULT_BUFFER_DEPTH,
            },
            scheduler: SchedulerSettings {
                skip_frames: DEFAULT_SKIP_FRAMES,
                reuse: ReusePolicy::default(),
            },
            stream: StreamSettings {
                jpeg_quality: DEFAULT_JPEG_QUALITY,
                write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            },
            pins: PinSettings {
                assignment: PinAssignment::from_lines(DEFAULT_PINS),
                backend: PinBackendKind::default(),
            },
            detector: DetectorSettings {
                model: DEFAULT_MODEL.to_string(),
                offload: false,
                timeout: Duration::from_millis(DEFAULT_INFERENCE_TIMEOUT_MS),
            },
            remote: RemoteSettings {
                url: DEFAULT_DETECT_URL.to_string(),
                timeout: Duration::from_millis(DEFAULT_DETECT_TIMEOUT_MS),
                retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            },
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        }
    }
}

impl RoverConfig {
    /// Load from `ROVER_CONFIG` (if set), apply environment overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROVER_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Same as `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => RoverConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RoverConfigFile) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(addr) = file.listen_addr {
            cfg.listen_addr = addr;
        }

        let camera = file.camera.unwrap_or_default();
        if let Some(device) = camera.device {
            cfg.camera.device = device;
        }
        if let Some(width) = camera.width {
            cfg.camera.width = width;
        }
        if let Some(height) = camera.height {
            cfg.camera.height = height;
        }
        if let Some(depth) = camera.buffer_depth {
            cfg.camera.buffer_depth = depth;
        }

        let scheduler = file.scheduler.unwrap_or_default();
        if let Some(skip) = scheduler.skip_frames {
            cfg.scheduler.skip_frames = skip;
        }
        if let Some(reuse) = scheduler.reuse.as_deref() {
            cfg.scheduler.reuse = reuse.parse()?;
        }

        let stream = file.stream.unwrap_or_default();
        if let Some(quality) = stream.jpeg_quality {
            cfg.stream.jpeg_quality = quality;
        }
        if let Some(ms) = stream.write_timeout_ms {
            cfg.stream.write_timeout = Duration::from_millis(ms);
        }

        let pins = file.pins.unwrap_or_default();
        if let Some(lines) = pins.lines {
            cfg.pins.assignment = PinAssignment::from_slice(&lines)?;
        }
        if let Some(backend) = pins.backend.as_deref() {
            cfg.pins.backend = backend.parse()?;
        }

        let detector = file.detector.unwrap_or_default();
        if let Some(model) = detector.model {
            cfg.detector.model = model;
        }
        if let Some(offload) = detector.offload {
            cfg.detector.offload = offload;
        }
        if let Some(ms) = detector.timeout_ms {
            cfg.detector.timeout = Duration::from_millis(ms);
        }

        let remote = file.remote.unwrap_or_default();
        if let Some(url) = remote.url {
            cfg.remote.url = url;
        }
        if let Some(ms) = remote.timeout_ms {
            cfg.remote.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = remote.retry_backoff_ms {
            cfg.remote.retry_backoff = Duration::from_millis(ms);
        }

        if let Some(ms) = file.shutdown_timeout_ms {
            cfg.shutdown_timeout = Duration::from_millis(ms);
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_string("ROVER_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(device) = env_string("ROVER_CAMERA_DEVICE") {
            self.camera.device = device;
        }
        if let Some(width) = env_parse("ROVER_CAMERA_WIDTH", "a positive integer")? {
            self.camera.width = width;
        }
        if let Some(height) = env_parse("ROVER_CAMERA_HEIGHT", "a positive integer")? {
            self.camera.height = height;
        }
        if let Some(depth) = env_parse("ROVER_CAMERA_BUFFER_DEPTH", "a positive integer")? {
            self.camera.buffer_depth = depth;
        }
        if let Some(skip) = env_parse("ROVER_SKIP_FRAMES", "a non-negative integer")? {
            self.scheduler.skip_frames = skip;
        }
        if let Some(policy) = env_string("ROVER_REUSE_POLICY") {
            self.scheduler.reuse = policy.parse()?;
        }
        if let Some(quality) = env_parse("ROVER_JPEG_QUALITY", "an integer in 1..=100")? {
            self.stream.jpeg_quality = quality;
        }
        if let Some(pins) = env_string("ROVER_PINS") {
            let lines = split_csv(&pins)
                .iter()
                .map(|line| {
                    line.parse::<u8>()
                        .map_err(|_| anyhow!("ROVER_PINS entry '{}' is not a pin number", line))
                })
                .collect::<Result<Vec<u8>>>()?;
            self.pins.assignment = PinAssignment::from_slice(&lines)?;
        }
        if let Some(backend) = env_string("ROVER_PIN_BACKEND") {
            self.pins.backend = backend.parse()?;
        }
        if let Some(model) = env_string("ROVER_MODEL") {
            self.detector.model = model;
        }
        if let Some(offload) = env_parse("ROVER_DETECTOR_OFFLOAD", "true or false")? {
            self.detector.offload = offload;
        }
        if let Some(url) = env_string("ROVER_DETECT_URL") {
            self.remote.url = url;
        }
        if let Some(ms) = env_parse::<u64>("ROVER_DETECT_TIMEOUT_MS", "an integer number of ms")? {
            self.remote.timeout = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero (got {}x{})",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.camera.buffer_depth == 0 {
            return Err(anyhow!("camera buffer_depth must be at least 1"));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!(
                "jpeg_quality must be in 1..=100 (got {})",
                self.stream.jpeg_quality
            ));
        }
        self.pins.assignment.validate()?;
        if self.detector.model.trim().is_empty() {
            return Err(anyhow!("detector model must not be empty"));
        }
        let url = url::Url::parse(&self.remote.url)
            .with_context(|| format!("invalid remote detect url {}", self.remote.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "remote detect url must be http(s), got '{}'",
                url.scheme()
            ));
        }
        if self.remote.timeout.is_zero() {
            return Err(anyhow!("remote timeout must be greater than zero"));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(anyhow!("shutdown timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<RoverConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {} (got '{}')", key, expected, value)),
        None => Ok(None),
    }
}

// Empty entries are kept so "17,,27" fails to parse instead of shrinking.
fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim().to_string())
        .collect()
}
