use rand::Rng;
use std::time::{Duration, Instant};
use url::Url;

use super::FrameSource;
use crate::config::CameraSettings;
use crate::error::CameraError;
use crate::frame::Frame;

const BLOCK_SIZE_DIVISOR: u32 = 5;
const NOISE_AMPLITUDE: i16 = 3;
const DEFAULT_FPS: u32 = 30;

/// Synthetic camera: a gradient background with a bright block sweeping
/// left to right, plus a little sensor noise.
///
/// `stub://name?frames=N` ends the stream after `N` frames with
/// `CameraError::Disconnected`, which is how tests model an unplugged camera.
/// `fps=N` paces delivery like a real sensor (default 30, `0` = unpaced).
pub struct SyntheticSource {
    device: String,
    width: u32,
    height: u32,
    frame_limit: Option<u64>,
    frame_count: u64,
    interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl SyntheticSource {
    pub fn open(settings: &CameraSettings) -> Result<Self, CameraError> {
        let url = Url::parse(&settings.device).map_err(|e| CameraError::Open {
            device: settings.device.clone(),
            reason: e.to_string(),
        })?;
        let query = |name: &str| -> Result<Option<u64>, CameraError> {
            match url.query_pairs().find(|(key, _)| key == name) {
                Some((_, value)) => value.parse::<u64>().map(Some).map_err(|_| CameraError::Open {
                    device: settings.device.clone(),
                    reason: format!("{} must be an integer, got '{}'", name, value),
                }),
                None => Ok(None),
            }
        };
        let frame_limit = query("frames")?;
        let fps = query("fps")?.unwrap_or(u64::from(DEFAULT_FPS));
        let interval = (fps > 0).then(|| Duration::from_secs(1) / fps.min(1_000) as u32);
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            settings.device,
            settings.width,
            settings.height
        );
        Ok(Self {
            device: settings.device.clone(),
            width: settings.width,
            height: settings.height,
            frame_limit,
            frame_count: 0,
            interval,
            last_frame: None,
        })
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let (width, height) = (self.width as usize, self.height as usize);
        let block = (self.width.min(self.height) / BLOCK_SIZE_DIVISOR).max(1) as usize;
        let span = width.saturating_sub(block).max(1);
        let block_x = (self.frame_count as usize * 4) % span;
        let block_y = height.saturating_sub(block) / 2;

        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u8; width * height * 3];
        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) * 3;
                let inside = x >= block_x && x < block_x + block && y >= block_y && y < block_y + block;
                let base = if inside {
                    [230i16, 220, 40]
                } else {
                    [(x * 96 / width) as i16 + 32, (y * 96 / height) as i16 + 32, 64]
                };
                for (channel, value) in base.into_iter().enumerate() {
                    let noise = rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
                    pixels[idx + channel] = (value + noise).clamp(0, 255) as u8;
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.device.clone()
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Err(CameraError::Disconnected(format!(
                "{} reached end of stream after {} frames",
                self.device, self.frame_count
            )));
        }
        if let (Some(interval), Some(last)) = (self.interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
        let pixels = self.generate_pixels();
        let frame = Frame::from_rgb(pixels, self.width, self.height, self.frame_count)
            .map_err(|e| CameraError::Disconnected(e.to_string()))?;
        self.frame_count += 1;
        Ok(frame)
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(device: &str) -> CameraSettings {
        CameraSettings {
            device: device.to_string(),
            width: 64,
            height: 48,
            buffer_depth: 1,
        }
    }

    #[test]
    fn produces_sequenced_frames() -> anyhow::Result<()> {
        let mut source = SyntheticSource::open(&settings("stub://test"))?;
        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!((first.width, first.height), (64, 48));
        assert_eq!(first.pixels().len(), 64 * 48 * 3);
        assert_eq!((first.seq, second.seq), (0, 1));
        assert_eq!(source.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn frame_limit_reports_disconnect() -> anyhow::Result<()> {
        let mut source = SyntheticSource::open(&settings("stub://test?frames=2"))?;
        source.next_frame()?;
        source.next_frame()?;
        assert!(matches!(
            source.next_frame(),
            Err(CameraError::Disconnected(_))
        ));
        Ok(())
    }

    #[test]
    fn paces_frames_at_requested_rate() -> anyhow::Result<()> {
        let mut source = SyntheticSource::open(&settings("stub://test?fps=20"))?;
        let started = Instant::now();
        for _ in 0..3 {
            source.next_frame()?;
        }
        assert!(started.elapsed() >= Duration::from_millis(90));
        Ok(())
    }

    #[test]
    fn rejects_malformed_frame_limit() {
        assert!(SyntheticSource::open(&settings("stub://test?frames=many")).is_err());
    }
}
