use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);
        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Clamp to a `width` x `height` frame.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let (fw, fh) = (width as f32, height as f32);
        let x = self.x.clamp(0.0, fw);
        let y = self.y.clamp(0.0, fh);
        Self {
            x,
            y,
            w: (self.x + self.w).clamp(0.0, fw) - x,
            h: (self.y + self.h).clamp(0.0, fh) - y,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Output of one oracle call over a source frame.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl DetectionResult {
    pub fn empty(frame_width: u32, frame_height: u32) -> Self {
        Self {
            detections: Vec::new(),
            frame_width,
            frame_height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Fraction of the frame covered by `bbox`.
    pub fn area_fraction(&self, bbox: &BoundingBox) -> f32 {
        let frame_area = self.frame_width as f32 * self.frame_height as f32;
        if frame_area <= 0.0 {
            0.0
        } else {
            bbox.area() / frame_area
        }
    }
}

/// Greedy non-maximum suppression, highest confidence first.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept = 0;
    for index in 0..detections.len() {
        let overlaps = (0..kept).any(|prev| {
            detections[prev].bbox.iou(&detections[index].bbox) > iou_threshold
        });
        if !overlaps {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}
