//! YOLOv8 ONNX backend on tract.
//!
//! Expects the standard detection export: input `[1, 3, S, S]` RGB in 0..1,
//! output `[1, 4 + classes, anchors]` with `cx, cy, w, h` in input pixels.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use super::coco::COCO_LABELS;
use crate::detect::oracle::DetectionOracle;
use crate::detect::result::{non_max_suppression, BoundingBox, Detection, DetectionResult};
use crate::frame::Frame;

const INPUT_SIZE: u32 = 640;
const BOX_FIELDS: usize = 4;

pub struct TractOracle {
    model: TypedRunnableModel<TypedModel>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractOracle {
    /// Load and optimize a model from disk.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            confidence_threshold: 0.4,
            iou_threshold: 0.45,
        })
    }

    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_image()?;
        let resized = image::imageops::resize(&image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= BOX_FIELDS {
            return Err(anyhow!("unexpected output shape {:?}", shape));
        }
        let (fields, anchors) = (shape[1], shape[2]);
        let sx = frame.width as f32 / INPUT_SIZE as f32;
        let sy = frame.height as f32 / INPUT_SIZE as f32;

        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let (class_id, confidence) = (BOX_FIELDS..fields)
                .map(|field| (field - BOX_FIELDS, preds[[0, field, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, candidate| {
                    if candidate.1 > best.1 {
                        candidate
                    } else {
                        best
                    }
                });
            if !confidence.is_finite() || confidence < self.confidence_threshold {
                continue;
            }
            let cx = preds[[0, 0, anchor]] * sx;
            let cy = preds[[0, 1, anchor]] * sy;
            let w = preds[[0, 2, anchor]] * sx;
            let h = preds[[0, 3, anchor]] * sy;
            detections.push(Detection {
                label: COCO_LABELS
                    .get(class_id)
                    .map(|label| label.to_string())
                    .unwrap_or_else(|| format!("class_{}", class_id)),
                confidence,
                bbox: BoundingBox::new(cx - w / 2.0, cy - h / 2.0, w, h)
                    .clamped(frame.width, frame.height),
            });
        }
        non_max_suppression(&mut detections, self.iou_threshold);
        Ok(detections)
    }
}

impl DetectionOracle for TractOracle {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        Ok(DetectionResult {
            detections: self.decode(outputs, frame)?,
            frame_width: frame.width,
            frame_height: frame.height,
        })
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::from_rgb(
            vec![0u8; (INPUT_SIZE * INPUT_SIZE * 3) as usize],
            INPUT_SIZE,
            INPUT_SIZE,
            0,
        )?;
        self.infer(&blank).map(|_| ())
    }
}
