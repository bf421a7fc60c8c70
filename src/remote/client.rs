use serde::Deserialize;
use std::error::Error as _;
use std::io;
use std::time::{Duration, Instant};

use crate::actuator::Direction;
use crate::api::http::form_body;
use crate::config::RemoteSettings;
use crate::detect::BoundingBox;
use crate::error::RemoteError;

#[derive(Debug, Deserialize)]
struct DetectReply {
    action: String,
    #[serde(default)]
    detections: Vec<RemoteDetection>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// A decision returned by the detection server.
#[derive(Debug)]
pub struct RemoteDecision {
    pub action: Direction,
    pub detections: Vec<RemoteDetection>,
    pub latency: Duration,
}

/// Client for a remote `/detect` endpoint.
///
/// Each call is bounded by the configured timeout, covering connect, upload
/// and response.
pub struct RemoteDetectClient {
    agent: ureq::Agent,
    url: String,
    timeout: Duration,
}

impl RemoteDetectClient {
    pub fn new(settings: &RemoteSettings) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        Self {
            agent,
            url: settings.url.clone(),
            timeout: settings.timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upload one JPEG and parse the server's decision.
    pub fn decide(&self, jpeg: &[u8]) -> Result<RemoteDecision, RemoteError> {
        let (content_type, body) = form_body("image", "image.jpg", "image/jpeg", jpeg);
        let started = Instant::now();
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .map_err(classify)?;
        let text = response.into_string().map_err(|err| {
            if is_timeout(&err) {
                RemoteError::Timeout
            } else {
                RemoteError::Transport(err.to_string())
            }
        })?;
        let latency = started.elapsed();

        let reply: DetectReply =
            serde_json::from_str(&text).map_err(|err| RemoteError::Malformed(err.to_string()))?;
        let action = reply
            .action
            .parse::<Direction>()
            .map_err(|err| RemoteError::Malformed(err.to_string()))?;
        Ok(RemoteDecision {
            action,
            detections: reply.detections,
            latency,
        })
    }

    /// `decide`, with every failure mapped to `Stop`.
    pub fn decide_or_stop(&self, jpeg: &[u8]) -> Direction {
        match self.decide(jpeg) {
            Ok(decision) => decision.action,
            Err(err) => {
                log::warn!("remote detect failed, stopping: {}", err);
                Direction::Stop
            }
        }
    }
}

fn classify(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, _) => RemoteError::Status(code),
        ureq::Error::Transport(transport) => {
            let timed_out = transport
                .source()
                .and_then(|source| source.downcast_ref::<io::Error>())
                .is_some_and(is_timeout);
            if timed_out {
                RemoteError::Timeout
            } else {
                RemoteError::Transport(transport.to_string())
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
