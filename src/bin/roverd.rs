//! roverd - rover control daemon
//!
//! This daemon:
//! 1. Acquires the pin bank, camera and detector (in that order)
//! 2. Streams annotated MJPEG on /video_feed
//! 3. Serves drive commands and the control page
//! 4. Stops the motors and releases the hardware on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use rover_pilot::{ControlServer, Lifecycle, ReusePolicy, RoverConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rover control daemon")]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "ROVER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address for the control server.
    #[arg(long)]
    listen: Option<String>,

    /// Raw frames shown between inference frames.
    #[arg(long)]
    skip_frames: Option<u32>,

    /// What skipped frames show: raw or last_annotated.
    #[arg(long, value_name = "POLICY")]
    reuse: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = RoverConfig::load_from(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        cfg.listen_addr = listen;
    }
    if let Some(skip) = args.skip_frames {
        cfg.scheduler.skip_frames = skip;
    }
    if let Some(reuse) = args.reuse {
        cfg.scheduler.reuse = reuse.parse::<ReusePolicy>()?;
    }

    // installed before any hardware is taken so an early Ctrl-C still releases it
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "roverd {} starting: camera={} model={} skip={} pins={:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.device,
        cfg.detector.model,
        cfg.scheduler.skip_frames,
        cfg.pins.assignment.lines()
    );

    let lifecycle = Lifecycle::acquire(&cfg)?;
    if rx.try_recv().is_ok() {
        log::info!("shutdown signal received during startup");
        lifecycle.shutdown();
        return Ok(());
    }
    lifecycle.start_stream()?;
    let control = ControlServer::new(cfg.listen_addr.clone(), lifecycle.control_state()).spawn()?;
    log::info!("roverd running. open http://{}/ to drive", control.addr);

    log::info!("roverd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    lifecycle.shutdown();
    control.stop()?;

    Ok(())
}
