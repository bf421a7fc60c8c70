//! rover_client - split-topology rover
//!
//! Captures frames locally, asks a remote detect_server what to do, and
//! drives accordingly. Any failed round-trip stops the motors until the
//! link comes back.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use rover_pilot::remote::DriveExit;
use rover_pilot::{RemoteSession, RoverConfig};

const EXIT_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive the rover from a remote detection server")]
struct Args {
    #[arg(long, env = "ROVER_CONFIG")]
    config: Option<PathBuf>,

    /// Detection endpoint, e.g. http://192.168.1.20:8000/detect
    #[arg(long)]
    url: Option<String>,

    /// Round-trip timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = RoverConfig::load_from(args.config.as_deref())?;
    if let Some(url) = args.url {
        cfg.remote.url = url;
    }
    if let Some(ms) = args.timeout_ms {
        cfg.remote.timeout = Duration::from_millis(ms);
    }

    // installed before any hardware is taken so an early Ctrl-C still releases it
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "rover_client {} starting: camera={} detect={} pins={:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.device,
        cfg.remote.url,
        cfg.pins.assignment.lines()
    );
    let session = RemoteSession::acquire(&cfg)?;

    loop {
        match rx.recv_timeout(EXIT_POLL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping...");
                break;
            }
            Err(RecvTimeoutError::Timeout) if session.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    session.shutdown();

    match session.take_outcome() {
        Some((DriveExit::Cancelled, _)) | None => Ok(()),
        Some((DriveExit::CameraLost(err), _)) => Err(err).context("camera lost"),
        Some((DriveExit::ActuatorLost(err), _)) => Err(err).context("pin bank lost"),
    }
}
