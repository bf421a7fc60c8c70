use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ExtendedColorType;

use crate::frame::DisplayFrame;

/// Multipart boundary used by `/video_feed`.
pub const BOUNDARY: &str = "frame";

/// Fixed-quality JPEG encoder for display frames.
#[derive(Clone, Copy, Debug)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, display: &DisplayFrame) -> Result<Vec<u8>> {
        let frame = display.frame();
        if frame.is_empty() {
            return Err(anyhow!("frame {} has no pixels", frame.seq));
        }
        let mut out = Vec::with_capacity(frame.pixels().len() / 8);
        ImageJpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(frame.pixels(), frame.width, frame.height, ExtendedColorType::Rgb8)
            .with_context(|| format!("jpeg encode of frame {}", frame.seq))?;
        Ok(out)
    }
}

/// Wrap one JPEG as a `multipart/x-mixed-replace` part.
pub fn frame_chunk(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn encodes_jpeg_with_soi_marker() {
        let frame = Frame::from_rgb(vec![120u8; 16 * 16 * 3], 16, 16, 0).unwrap();
        let jpeg = JpegEncoder::new(80).encode(&DisplayFrame::Raw(frame)).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }

    #[test]
    fn empty_frame_is_an_error() {
        let frame = Frame::from_rgb(Vec::new(), 0, 0, 3).unwrap();
        assert!(JpegEncoder::new(80).encode(&DisplayFrame::Raw(frame)).is_err());
    }

    #[test]
    fn chunk_carries_boundary_and_length() {
        let chunk = frame_chunk(b"JPEGDATA");
        let text = String::from_utf8_lossy(&chunk);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\n"));
        assert!(text.contains("Content-Length: 8\r\n\r\nJPEGDATA\r\n"));
        assert!(chunk.ends_with(b"JPEGDATA\r\n"));
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(JpegEncoder::new(0).quality(), 1);
        assert_eq!(JpegEncoder::new(255).quality(), 100);
    }
}
