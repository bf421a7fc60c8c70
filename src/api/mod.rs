//! HTTP surfaces.
//!
//! - Control server (`ControlServer`): driver page, MJPEG stream, drive
//!   commands, health/status
//! - Detection server (`DetectServer`): `POST /detect` for the split topology
//!
//! Both share one accept loop: a nonblocking listener polled against a
//! shutdown flag, with one thread per connection so a long-lived video
//! viewer never holds up a command.

mod detect;
pub mod http;
mod page;

pub use detect::DetectServer;

use anyhow::{anyhow, Result};
use serde_json::json;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::actuator::Direction;
use crate::gateway::{CommandGateway, CommandOutcome};
use crate::stream::{FrameHub, PipelineStats, Recv, BOUNDARY};
use http::{read_request, write_json_response, write_response, HttpRequest};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const VIEWER_POLL: Duration = Duration::from_millis(250);
const MAX_COMMAND_BODY: usize = 64 * 1024;

/// Running server; `stop` ends the accept loop and open viewer streams.
#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

pub type ControlHandle = ServerHandle;

impl ServerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("server accept thread panicked"))?;
        }
        Ok(())
    }
}

type Handler = dyn Fn(TcpStream, &AtomicBool) -> Result<()> + Send + Sync;

pub(crate) fn serve(addr: &str, label: &'static str, handler: Arc<Handler>) -> Result<ServerHandle> {
    let configured: SocketAddr = addr
        .parse()
        .map_err(|e| anyhow!("invalid {} listen address '{}': {}", label, addr, e))?;
    let listener = TcpListener::bind(configured)?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_thread = shutdown.clone();
    let join = std::thread::Builder::new()
        .name(format!("{}-accept", label))
        .spawn(move || {
            if let Err(err) = accept_loop(listener, label, handler, shutdown_thread) {
                log::error!("{} server stopped: {}", label, err);
            }
        })?;

    Ok(ServerHandle {
        addr,
        shutdown,
        join: Some(join),
    })
}

fn accept_loop(
    listener: TcpListener,
    label: &'static str,
    handler: Arc<Handler>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                let handler = handler.clone();
                let shutdown = shutdown.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("{}-conn", label))
                    .spawn(move || {
                        if let Err(err) = handler(stream, &shutdown) {
                            log::warn!("{} request from {} failed: {:#}", label, peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("{} could not spawn connection thread: {}", label, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Everything the control routes read or drive.
#[derive(Clone)]
pub struct ControlState {
    pub gateway: CommandGateway,
    pub hub: FrameHub,
    pub stats: Arc<PipelineStats>,
    pub write_timeout: Duration,
}

pub struct ControlServer {
    addr: String,
    state: ControlState,
}

impl ControlServer {
    pub fn new(addr: impl Into<String>, state: ControlState) -> Self {
        Self {
            addr: addr.into(),
            state,
        }
    }

    pub fn spawn(self) -> Result<ControlHandle> {
        let state = self.state;
        let handler: Arc<Handler> = Arc::new(move |stream: TcpStream, shutdown: &AtomicBool| {
            handle_control(stream, &state, shutdown)
        });
        let handle = serve(&self.addr, "control", handler)?;
        log::info!("control server listening on {}", handle.addr);
        Ok(handle)
    }
}

fn handle_control(mut stream: TcpStream, state: &ControlState, shutdown: &AtomicBool) -> Result<()> {
    let request = read_request(&mut stream, MAX_COMMAND_BODY)?;
    if request.method != "GET" {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }

    match request.path.as_str() {
        "/" => write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            page::CONTROL_PAGE.as_bytes(),
        ),
        "/video_feed" => stream_viewer(stream, state, shutdown),
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/status" => write_status(&mut stream, state),
        path => {
            if let Some(token) = path.strip_prefix("/cmd/") {
                return command(&mut stream, state, token, &request, false);
            }
            let token = path.trim_start_matches('/');
            if token.parse::<Direction>().is_ok() {
                return command(&mut stream, state, token, &request, true);
            }
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)
        }
    }
}

fn command(
    stream: &mut TcpStream,
    state: &ControlState,
    token: &str,
    request: &HttpRequest,
    acknowledge: bool,
) -> Result<()> {
    log::debug!("command {} via {}", token, request.raw_path);
    match state.gateway.handle(token) {
        CommandOutcome::Applied(direction) if acknowledge => {
            write_response(stream, 200, "text/plain; charset=utf-8", direction.ack().as_bytes())
        }
        CommandOutcome::Applied(_) => write_response(stream, 204, "text/plain", &[]),
        CommandOutcome::Unrecognized(_) => {
            write_json_response(stream, 400, r#"{"error":"unknown_direction","applied":"stop"}"#)
        }
        CommandOutcome::Failed(err) => {
            let body = json!({ "error": "actuator_unavailable", "detail": err.to_string() });
            write_json_response(stream, 503, &body.to_string())
        }
    }
}

fn write_status(stream: &mut TcpStream, state: &ControlState) -> Result<()> {
    let actuator = state.gateway.actuator();
    let body = json!({
        "direction": actuator.current(),
        "pins": actuator.pin_state().lines(),
        "released": actuator.is_released(),
        "viewers": state.hub.viewer_count(),
        "dropped_chunks": state.hub.dropped(),
        "stream": state.stats.snapshot(),
    });
    write_json_response(stream, 200, &body.to_string())
}

fn stream_viewer(mut stream: TcpStream, state: &ControlState, shutdown: &AtomicBool) -> Result<()> {
    let subscription = state.hub.subscribe();
    if state.hub.is_closed() {
        log::info!("viewer {} refused, stream has ended", subscription.id());
        return write_json_response(&mut stream, 503, r#"{"error":"stream_unavailable"}"#);
    }
    stream.set_write_timeout(Some(state.write_timeout))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let viewer = subscription.id();
    log::info!("viewer {} connected from {}", viewer, stream.peer_addr()?);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match subscription.recv_timeout(VIEWER_POLL) {
            Recv::Chunk(chunk) => {
                if let Err(err) = stream.write_all(&chunk) {
                    log::info!("viewer {} disconnected: {}", viewer, err);
                    break;
                }
            }
            Recv::Idle => continue,
            Recv::Closed => break,
        }
    }
    log::debug!("viewer {} stream closed", viewer);
    Ok(())
}
