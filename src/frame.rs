//! Frames and per-tick display frames.
//!
//! - `Frame`: immutable RGB8 image produced by a frame source.
//! - `DisplayFrame`: the frame chosen for one pipeline tick.
//!
//! Pixel data sits behind an `Arc<[u8]>` and no `&mut` accessor exists, so a
//! frame can be handed between stages (and cached) without any stage being
//! able to mutate it under another.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::Arc;
use std::time::SystemTime;

/// One captured camera image.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Wall-clock capture time.
    pub timestamp: SystemTime,
    /// Capture sequence number assigned by the source (starts at 0).
    pub seq: u64,
}

impl Frame {
    /// Build a frame from tightly packed RGB8 pixels.
    ///
    /// Rejects buffers whose length does not match `width * height * 3`; a
    /// frame is never produced from a partially decoded buffer.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels: pixels.into(),
            width,
            height,
            timestamp: SystemTime::now(),
            seq,
        })
    }

    /// Build a frame from a decoded image.
    pub fn from_image(image: RgbImage, seq: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            pixels: image.into_raw().into(),
            width,
            height,
            timestamp: SystemTime::now(),
            seq,
        }
    }

    /// Read-only pixel access.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty() || self.width == 0 || self.height == 0
    }

    /// Copy into an owned image buffer (for rendering or encoding).
    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.to_vec())
            .ok_or_else(|| anyhow!("frame {} has inconsistent dimensions", self.seq))
    }

    /// Derive a new frame with the same capture metadata and new pixels.
    pub(crate) fn with_image(&self, image: RgbImage) -> Self {
        Self {
            pixels: image.into_raw().into(),
            width: self.width,
            height: self.height,
            timestamp: self.timestamp,
            seq: self.seq,
        }
    }

    /// True when both frames share the same pixel allocation.
    pub fn same_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

/// The frame shown for a single tick.
#[derive(Clone, Debug)]
pub enum DisplayFrame {
    /// Fresh detection result rendered onto the captured frame.
    Annotated(Frame),
    /// Captured frame shown without detection.
    Raw(Frame),
    /// Last annotated frame shown again on a skipped tick.
    Reused(Frame),
}

impl DisplayFrame {
    pub fn frame(&self) -> &Frame {
        match self {
            DisplayFrame::Annotated(frame)
            | DisplayFrame::Raw(frame)
            | DisplayFrame::Reused(frame) => frame,
        }
    }

    pub fn is_annotated(&self) -> bool {
        matches!(self, DisplayFrame::Annotated(_))
    }

    pub fn into_frame(self) -> Frame {
        match self {
            DisplayFrame::Annotated(frame)
            | DisplayFrame::Raw(frame)
            | DisplayFrame::Reused(frame) => frame,
        }
    }
}
