use anyhow::Result;

use crate::detect::oracle::DetectionOracle;
use crate::detect::result::{BoundingBox, Detection, DetectionResult};
use crate::frame::Frame;

/// Deterministic backend: reports one object in the middle third of every
/// frame. Useful for wiring checks where no model is available.
#[derive(Debug, Default)]
pub struct StubOracle {
    calls: u64,
}

impl StubOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectionOracle for StubOracle {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, frame: &Frame) -> Result<DetectionResult> {
        self.calls += 1;
        let (w, h) = (frame.width as f32, frame.height as f32);
        Ok(DetectionResult {
            detections: vec![Detection {
                label: "object".to_string(),
                confidence: 0.9,
                bbox: BoundingBox::new(w / 3.0, h / 3.0, w / 3.0, h / 3.0),
            }],
            frame_width: frame.width,
            frame_height: frame.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_centered_object() {
        let frame = Frame::from_rgb(vec![0u8; 30 * 30 * 3], 30, 30, 0).unwrap();
        let mut oracle = StubOracle::new();
        let result = oracle.infer(&frame).unwrap();
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].bbox, BoundingBox::new(10.0, 10.0, 10.0, 10.0));
        assert_eq!(oracle.calls(), 1);
    }
}
