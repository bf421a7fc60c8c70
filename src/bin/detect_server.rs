//! detect_server - remote detection for the split topology
//!
//! Accepts `POST /detect` with a multipart `image` field and answers with
//! `{"action": ..., "detections": [...]}`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use rover_pilot::detect::{open_oracle, shared};
use rover_pilot::{DetectServer, RoverConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detection server for rover_client")]
struct Args {
    #[arg(long, env = "ROVER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "ROVER_DETECT_LISTEN", default_value = "0.0.0.0:8000")]
    listen: String,

    /// Detector: stub, motion or a YOLOv8 .onnx path.
    #[arg(long)]
    model: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = RoverConfig::load_from(args.config.as_deref())?;
    if let Some(model) = args.model {
        cfg.detector.model = model;
    }

    let oracle = shared(open_oracle(&cfg.detector)?);
    let handle = DetectServer::new(args.listen, oracle).spawn()?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("detect_server waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping detect server...");
    handle.stop()?;
    Ok(())
}
