use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use rover_pilot::actuator::{PinAssignment, PinBackendKind};
use rover_pilot::{ReusePolicy, RoverConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ROVER_CONFIG",
        "ROVER_LISTEN_ADDR",
        "ROVER_CAMERA_DEVICE",
        "ROVER_CAMERA_WIDTH",
        "ROVER_CAMERA_HEIGHT",
        "ROVER_CAMERA_BUFFER_DEPTH",
        "ROVER_SKIP_FRAMES",
        "ROVER_REUSE_POLICY",
        "ROVER_JPEG_QUALITY",
        "ROVER_PINS",
        "ROVER_PIN_BACKEND",
        "ROVER_MODEL",
        "ROVER_DETECTOR_OFFLOAD",
        "ROVER_DETECT_URL",
        "ROVER_DETECT_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_match_documented_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RoverConfig::load().expect("load defaults");
    assert_eq!(cfg.listen_addr, "0.0.0.0:5000");
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.camera.buffer_depth, 1);
    assert_eq!(cfg.scheduler.skip_frames, 3);
    assert_eq!(cfg.scheduler.reuse, ReusePolicy::Raw);
    assert_eq!(cfg.stream.jpeg_quality, 80);
    assert_eq!(cfg.pins.assignment, PinAssignment::from_lines([17, 27, 22, 5]));
    assert_eq!(cfg.pins.backend, PinBackendKind::Memory);
    assert_eq!(cfg.detector.model, "motion");
    assert!(!cfg.detector.offload);
    assert_eq!(cfg.remote.url, "http://127.0.0.1:8000/detect");
    assert_eq!(cfg.remote.timeout, Duration::from_secs(2));
    assert_eq!(cfg.remote.retry_backoff, Duration::from_secs(1));
    assert_eq!(cfg.shutdown_timeout, Duration::from_secs(2));
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "listen_addr": "127.0.0.1:5050",
            "camera": { "device": "stub://bench", "width": 640, "height": 480 },
            "scheduler": { "skip_frames": 4, "reuse": "last_annotated" },
            "stream": { "jpeg_quality": 70, "write_timeout_ms": 500 },
            "pins": { "lines": [5, 6, 13, 19] },
            "detector": { "model": "stub", "offload": true, "timeout_ms": 900 },
            "remote": { "url": "http://10.0.0.2:8000/detect", "retry_backoff_ms": 250 },
            "shutdown_timeout_ms": 3000
        }"#,
    );
    std::env::set_var("ROVER_CONFIG", file.path());
    std::env::set_var("ROVER_SKIP_FRAMES", "0");
    std::env::set_var("ROVER_DETECT_TIMEOUT_MS", "750");

    let cfg = RoverConfig::load().expect("load config");
    assert_eq!(cfg.listen_addr, "127.0.0.1:5050");
    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.scheduler.skip_frames, 0);
    assert_eq!(cfg.scheduler.reuse, ReusePolicy::LastAnnotated);
    assert_eq!(cfg.stream.jpeg_quality, 70);
    assert_eq!(cfg.stream.write_timeout, Duration::from_millis(500));
    assert_eq!(cfg.pins.assignment.lines(), [5, 6, 13, 19]);
    assert_eq!(cfg.detector.model, "stub");
    assert!(cfg.detector.offload);
    assert_eq!(cfg.detector.timeout, Duration::from_millis(900));
    assert_eq!(cfg.remote.url, "http://10.0.0.2:8000/detect");
    assert_eq!(cfg.remote.timeout, Duration::from_millis(750));
    assert_eq!(cfg.remote.retry_backoff, Duration::from_millis(250));
    assert_eq!(cfg.shutdown_timeout, Duration::from_secs(3));

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
listen_addr = "127.0.0.1:6000"

[scheduler]
skip_frames = 2

[pins]
lines = [17, 27, 22, 5]
backend = "memory"
"#,
    );
    let cfg = RoverConfig::load_from(Some(file.path())).expect("load toml");
    assert_eq!(cfg.listen_addr, "127.0.0.1:6000");
    assert_eq!(cfg.scheduler.skip_frames, 2);
    assert_eq!(cfg.pins.backend, PinBackendKind::Memory);
}

#[test]
fn env_pins_and_policy_override_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ROVER_PINS", "4, 17, 22, 27");
    std::env::set_var("ROVER_REUSE_POLICY", "last_annotated");
    std::env::set_var("ROVER_DETECTOR_OFFLOAD", "true");
    let cfg = RoverConfig::load_from(None).expect("load env");
    assert_eq!(cfg.pins.assignment.lines(), [4, 17, 22, 27]);
    assert_eq!(cfg.scheduler.reuse, ReusePolicy::LastAnnotated);
    assert!(cfg.detector.offload);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    let cases: [(&str, &str); 10] = [
        ("ROVER_SKIP_FRAMES", "-1"),
        ("ROVER_SKIP_FRAMES", "lots"),
        ("ROVER_CAMERA_WIDTH", "0"),
        ("ROVER_JPEG_QUALITY", "101"),
        ("ROVER_PINS", "17,17,22,5"),
        ("ROVER_PINS", "17,27,22,40"),
        ("ROVER_PINS", "17,,27,22,5"),
        ("ROVER_PINS", "17,27,22,5,"),
        ("ROVER_REUSE_POLICY", "sometimes"),
        ("ROVER_PIN_BACKEND", "parport"),
    ];
    for (key, value) in cases {
        clear_env();
        std::env::set_var(key, value);
        assert!(
            RoverConfig::load_from(None).is_err(),
            "{}={} should be rejected",
            key,
            value
        );
    }
    clear_env();
}

#[test]
fn rejects_unreadable_or_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(".json", "{ not json");
    assert!(RoverConfig::load_from(Some(file.path())).is_err());
    assert!(RoverConfig::load_from(Some(std::path::Path::new("/nonexistent/rover.json"))).is_err());
}
