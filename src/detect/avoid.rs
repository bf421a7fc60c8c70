//! Obstacle avoidance: turn a detection result into a drive direction.
//!
//! Only boxes that reach into the central corridor (the middle third of
//! the frame) count as obstacles. A box covering `stop_area` of the frame
//! halts the rover; a smaller obstacle steers it toward the side with
//! more free space.

use crate::actuator::Direction;
use crate::detect::result::{Detection, DetectionResult};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvoidancePolicy {
    /// Boxes smaller than this fraction of the frame are ignored.
    pub obstacle_area: f32,
    /// Boxes at least this large stop the rover outright.
    pub stop_area: f32,
    pub min_confidence: f32,
}

impl Default for AvoidancePolicy {
    fn default() -> Self {
        Self {
            obstacle_area: 0.08,
            stop_area: 0.35,
            min_confidence: 0.4,
        }
    }
}

impl AvoidancePolicy {
    pub fn decide(&self, result: &DetectionResult) -> Direction {
        let width = result.frame_width as f32;
        if width <= 0.0 {
            return Direction::Stop;
        }
        let (corridor_left, corridor_right) = (width / 3.0, width * 2.0 / 3.0);

        let mut nearest: Option<(&Detection, f32)> = None;
        for detection in &result.detections {
            if detection.confidence < self.min_confidence {
                continue;
            }
            let bbox = detection.bbox;
            let fraction = result.area_fraction(&bbox);
            if fraction < self.obstacle_area {
                continue;
            }
            if bbox.x + bbox.w < corridor_left || bbox.x > corridor_right {
                continue;
            }
            if nearest.map_or(true, |(_, best)| fraction > best) {
                nearest = Some((detection, fraction));
            }
        }

        match nearest {
            None => Direction::Forward,
            Some((_, fraction)) if fraction >= self.stop_area => Direction::Stop,
            Some((detection, _)) => {
                if detection.bbox.center_x() < width / 2.0 {
                    Direction::Right
                } else {
                    Direction::Left
                }
            }
        }
    }
}

/// Decide with the default policy.
pub fn decide(result: &DetectionResult) -> Direction {
    AvoidancePolicy::default().decide(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn result(boxes: &[(f32, f32, f32, f32, f32)]) -> DetectionResult {
        DetectionResult {
            detections: boxes
                .iter()
                .map(|&(x, y, w, h, confidence)| Detection {
                    label: "object".into(),
                    confidence,
                    bbox: BoundingBox::new(x, y, w, h),
                })
                .collect(),
            frame_width: 300,
            frame_height: 300,
        }
    }

    #[test]
    fn clear_path_drives_forward() {
        assert_eq!(decide(&result(&[])), Direction::Forward);
        // tiny box and box outside the corridor are ignored
        assert_eq!(
            decide(&result(&[(140.0, 140.0, 10.0, 10.0, 0.9), (0.0, 0.0, 90.0, 300.0, 0.9)])),
            Direction::Forward
        );
    }

    #[test]
    fn low_confidence_is_ignored() {
        assert_eq!(
            decide(&result(&[(100.0, 100.0, 100.0, 100.0, 0.2)])),
            Direction::Forward
        );
    }

    #[test]
    fn steers_away_from_obstacle() {
        // left-leaning obstacle, roughly 11% of the frame
        assert_eq!(
            decide(&result(&[(60.0, 100.0, 100.0, 100.0, 0.8)])),
            Direction::Right
        );
        assert_eq!(
            decide(&result(&[(150.0, 100.0, 100.0, 100.0, 0.8)])),
            Direction::Left
        );
    }

    #[test]
    fn large_obstacle_stops() {
        assert_eq!(
            decide(&result(&[(50.0, 50.0, 200.0, 200.0, 0.9)])),
            Direction::Stop
        );
    }

    #[test]
    fn degenerate_frame_stops() {
        assert_eq!(decide(&DetectionResult::default()), Direction::Stop);
    }
}
