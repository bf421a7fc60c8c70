use anyhow::Result;
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([0, 255, 0]),
    Rgb([255, 64, 64]),
    Rgb([64, 160, 255]),
    Rgb([255, 200, 0]),
    Rgb([200, 64, 255]),
    Rgb([0, 220, 220]),
];

// Outline thickness in pixels.
const STROKE: i32 = 2;

fn label_color(label: &str) -> Rgb<u8> {
    let hash = label
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    PALETTE[hash % PALETTE.len()]
}

fn outline(detection: &Detection, width: u32, height: u32) -> Option<Rect> {
    let bbox = detection.bbox.clamped(width, height);
    let w = bbox.w.round() as u32;
    let h = bbox.h.round() as u32;
    if w == 0 || h == 0 {
        return None;
    }
    Some(Rect::at(bbox.x.round() as i32, bbox.y.round() as i32).of_size(w, h))
}

impl DetectionResult {
    /// Draw this result's boxes onto a copy of `frame`.
    ///
    /// The source frame is never modified; the returned frame keeps its
    /// sequence number and capture time.
    pub fn annotate(&self, frame: &Frame) -> Result<Frame> {
        let mut canvas = frame.to_image()?;
        for detection in &self.detections {
            let Some(rect) = outline(detection, frame.width, frame.height) else {
                continue;
            };
            let color = label_color(&detection.label);
            for inset in 0..STROKE {
                let w = rect.width() as i32 - 2 * inset;
                let h = rect.height() as i32 - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                let ring = Rect::at(rect.left() + inset, rect.top() + inset)
                    .of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, ring, color);
            }
        }
        Ok(frame.with_image(canvas))
    }
}
