use anyhow::{Context, Result};
use serde_json::json;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::http::{read_request, write_json_response};
use super::{serve, Handler, ServerHandle};
use crate::detect::{AvoidancePolicy, SharedOracle};
use crate::frame::Frame;

const MAX_IMAGE_BODY: usize = 8 * 1024 * 1024;

/// Remote detection endpoint: `POST /detect` with a multipart `image`
/// field, answered with the avoidance decision and the raw detections.
pub struct DetectServer {
    addr: String,
    oracle: SharedOracle,
    policy: AvoidancePolicy,
}

impl DetectServer {
    pub fn new(addr: impl Into<String>, oracle: SharedOracle) -> Self {
        Self {
            addr: addr.into(),
            oracle,
            policy: AvoidancePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AvoidancePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn spawn(self) -> Result<ServerHandle> {
        let service = Arc::new(DetectService {
            oracle: self.oracle,
            policy: self.policy,
            requests: AtomicU64::new(0),
        });
        let handler: Arc<Handler> = Arc::new(move |stream: TcpStream, _shutdown: &AtomicBool| {
            service.handle(stream)
        });
        let handle = serve(&self.addr, "detect", handler)?;
        log::info!("detect server listening on {}", handle.addr);
        Ok(handle)
    }
}

struct DetectService {
    oracle: SharedOracle,
    policy: AvoidancePolicy,
    requests: AtomicU64,
}

impl DetectService {
    fn handle(&self, mut stream: TcpStream) -> Result<()> {
        let request = read_request(&mut stream, MAX_IMAGE_BODY)?;
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
            ("POST", "/detect") => {
                let frame = match request
                    .form_part("image")
                    .and_then(|jpeg| self.decode(jpeg))
                {
                    Ok(frame) => frame,
                    Err(err) => {
                        let body = json!({ "error": "bad_image", "detail": format!("{:#}", err) });
                        return write_json_response(&mut stream, 400, &body.to_string());
                    }
                };
                self.respond(&mut stream, frame)
            }
            (_, "/detect") | (_, "/health") => {
                write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)
            }
            _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
        }
    }

    fn decode(&self, jpeg: &[u8]) -> Result<Frame> {
        let image = image::load_from_memory(jpeg).context("decode uploaded image")?;
        let seq = self.requests.fetch_add(1, Ordering::Relaxed);
        Ok(Frame::from_image(image.to_rgb8(), seq))
    }

    fn respond(&self, stream: &mut TcpStream, frame: Frame) -> Result<()> {
        let started = Instant::now();
        let result = {
            let mut oracle = match self.oracle.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            oracle.infer(&frame)
        };
        match result {
            Ok(result) => {
                let action = self.policy.decide(&result);
                log::info!(
                    "detect #{}: {} detection(s) -> {} in {} ms",
                    frame.seq,
                    result.detections.len(),
                    action,
                    started.elapsed().as_millis()
                );
                let body = json!({ "action": action, "detections": result.detections });
                write_json_response(stream, 200, &body.to_string())
            }
            Err(err) => {
                log::warn!("detect #{}: inference failed: {:#}", frame.seq, err);
                write_json_response(stream, 500, r#"{"error":"inference_failed","action":"stop"}"#)
            }
        }
    }
}
