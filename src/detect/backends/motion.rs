use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::oracle::DetectionOracle;
use crate::detect::result::{BoundingBox, Detection, DetectionResult};
use crate::frame::Frame;

const CELL: u32 = 8;
const DIFF_THRESHOLD: u32 = 24;
const MIN_CELLS: usize = 2;

/// CPU backend: frame differencing over a coarse luma grid.
///
/// Cells whose mean luma moved by more than a threshold since the previous
/// call are grouped into 4-connected blobs; each blob becomes a `motion`
/// detection. The first call (or a resolution change) reports nothing.
#[derive(Default)]
pub struct MotionOracle {
    previous: Option<LumaGrid>,
}

struct LumaGrid {
    cols: u32,
    rows: u32,
    frame_width: u32,
    frame_height: u32,
    cells: Vec<u32>,
}

impl LumaGrid {
    fn from_frame(frame: &Frame) -> Self {
        let cols = frame.width.div_ceil(CELL);
        let rows = frame.height.div_ceil(CELL);
        let mut sums = vec![0u32; (cols * rows) as usize];
        let mut counts = vec![0u32; (cols * rows) as usize];
        let pixels = frame.pixels();
        for y in 0..frame.height {
            for x in 0..frame.width {
                let idx = ((y * frame.width + x) * 3) as usize;
                let luma = (pixels[idx] as u32 * 299
                    + pixels[idx + 1] as u32 * 587
                    + pixels[idx + 2] as u32 * 114)
                    / 1000;
                let cell = ((y / CELL) * cols + x / CELL) as usize;
                sums[cell] += luma;
                counts[cell] += 1;
            }
        }
        let cells = sums
            .iter()
            .zip(&counts)
            .map(|(sum, count)| if *count == 0 { 0 } else { sum / count })
            .collect();
        Self {
            cols,
            rows,
            frame_width: frame.width,
            frame_height: frame.height,
            cells,
        }
    }

    fn same_shape(&self, other: &LumaGrid) -> bool {
        self.frame_width == other.frame_width && self.frame_height == other.frame_height
    }
}

impl MotionOracle {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(previous: &LumaGrid, current: &LumaGrid) -> Vec<Detection> {
        let changed: Vec<bool> = previous
            .cells
            .iter()
            .zip(&current.cells)
            .map(|(a, b)| a.abs_diff(*b) > DIFF_THRESHOLD)
            .collect();
        let mut seen = vec![false; changed.len()];
        let mut detections = Vec::new();
        let (cols, rows) = (current.cols as i64, current.rows as i64);

        for start in 0..changed.len() {
            if !changed[start] || seen[start] {
                continue;
            }
            seen[start] = true;
            let mut queue = VecDeque::from([start]);
            let (mut min_c, mut min_r, mut max_c, mut max_r) = (i64::MAX, i64::MAX, 0i64, 0i64);
            let mut size = 0usize;
            while let Some(cell) = queue.pop_front() {
                size += 1;
                let (c, r) = (cell as i64 % cols, cell as i64 / cols);
                min_c = min_c.min(c);
                min_r = min_r.min(r);
                max_c = max_c.max(c);
                max_r = max_r.max(r);
                for (dc, dr) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
                    let (nc, nr) = (c + dc, r + dr);
                    if nc < 0 || nr < 0 || nc >= cols || nr >= rows {
                        continue;
                    }
                    let next = (nr * cols + nc) as usize;
                    if changed[next] && !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            if size < MIN_CELLS {
                continue;
            }
            let span = ((max_c - min_c + 1) * (max_r - min_r + 1)) as f32;
            let bbox = BoundingBox::new(
                (min_c as u32 * CELL) as f32,
                (min_r as u32 * CELL) as f32,
                ((max_c - min_c + 1) as u32 * CELL) as f32,
                ((max_r - min_r + 1) as u32 * CELL) as f32,
            )
            .clamped(current.frame_width, current.frame_height);
            detections.push(Detection {
                label: "motion".to_string(),
                confidence: (size as f32 / span).min(1.0),
                bbox,
            });
        }
        detections
    }
}

impl DetectionOracle for MotionOracle {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn infer(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let current = LumaGrid::from_frame(frame);
        let detections = match &self.previous {
            Some(previous) if previous.same_shape(&current) => Self::blobs(previous, &current),
            _ => Vec::new(),
        };
        self.previous = Some(current);
        Ok(DetectionResult {
            detections,
            frame_width: frame.width,
            frame_height: frame.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_block(x0: u32, seq: u64) -> Frame {
        let (w, h) = (64u32, 48u32);
        let mut pixels = vec![20u8; (w * h * 3) as usize];
        for y in 16..32 {
            for x in x0..x0 + 16 {
                let idx = ((y * w + x) * 3) as usize;
                pixels[idx..idx + 3].copy_from_slice(&[250, 250, 250]);
            }
        }
        Frame::from_rgb(pixels, w, h, seq).unwrap()
    }

    #[test]
    fn first_frame_reports_nothing() {
        let mut oracle = MotionOracle::new();
        let result = oracle.infer(&frame_with_block(0, 0)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn moving_block_is_boxed() {
        let mut oracle = MotionOracle::new();
        oracle.infer(&frame_with_block(0, 0)).unwrap();
        let result = oracle.infer(&frame_with_block(32, 1)).unwrap();
        // Old and new positions both changed: two blobs.
        assert_eq!(result.detections.len(), 2);
        assert!(result
            .detections
            .iter()
            .any(|d| d.bbox.x <= 32.0 && d.bbox.x + d.bbox.w >= 48.0));
        assert!(result.detections.iter().all(|d| d.label == "motion"));
    }

    #[test]
    fn static_scene_reports_nothing() {
        let mut oracle = MotionOracle::new();
        oracle.infer(&frame_with_block(8, 0)).unwrap();
        let result = oracle.infer(&frame_with_block(8, 1)).unwrap();
        assert!(result.is_empty());
    }
}
