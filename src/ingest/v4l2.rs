//! V4L2 camera source.
//!
//! Captures from a local device node (e.g. /dev/video0). The driver is asked
//! for packed RGB; devices that only offer MJPEG are decoded per frame.
//! `buffer_depth` sets the mmap buffer count, so a depth of 1 always hands
//! out the newest frame at the cost of occasional stalls.

use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;

use super::{skip_corrupt, FrameSource, Grab};
use crate::config::CameraSettings;
use crate::error::CameraError;
use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelLayout {
    Rgb3,
    Mjpeg,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Source {
    device_path: String,
    state: DeviceState,
    layout: PixelLayout,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl V4l2Source {
    pub fn open(settings: &CameraSettings) -> Result<Self, CameraError> {
        let open_err = |reason: String| CameraError::Open {
            device: settings.device.clone(),
            reason,
        };

        let device = v4l::Device::with_path(&settings.device).map_err(|e| open_err(e.to_string()))?;
        let mut format = device
            .format()
            .map_err(|e| open_err(format!("read format: {}", e)))?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    settings.device,
                    err
                );
                device
                    .format()
                    .map_err(|e| open_err(format!("read format after set failure: {}", e)))?
            }
        };

        let layout = match &format.fourcc.repr {
            b"RGB3" => PixelLayout::Rgb3,
            b"MJPG" => PixelLayout::Mjpeg,
            other => {
                return Err(open_err(format!(
                    "unsupported pixel format {}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(
                    device,
                    Type::VideoCapture,
                    settings.buffer_depth,
                )
            },
        }
        .try_build()
        .map_err(|e| open_err(format!("create buffer stream: {}", e)))?;

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?}, {} buffers)",
            settings.device,
            format.width,
            format.height,
            layout,
            settings.buffer_depth
        );
        Ok(Self {
            device_path: settings.device.clone(),
            state,
            layout,
            width: format.width,
            height: format.height,
            frame_count: 0,
        })
    }
}

impl V4l2Source {
    fn read_once(&mut self) -> Result<Grab, CameraError> {
        let buf = self
            .state
            .with_stream_mut(|stream| stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|e| CameraError::Disconnected(format!("{}: {}", self.device_path, e)))?;
        if buf.is_empty() {
            return Err(CameraError::Disconnected(format!(
                "{}: empty buffer (end of stream)",
                self.device_path
            )));
        }

        let capture = match self.layout {
            PixelLayout::Rgb3 => {
                match Frame::from_rgb(buf, self.width, self.height, self.frame_count) {
                    Ok(frame) => Grab::Frame(frame),
                    Err(err) => Grab::Corrupt(err.to_string()),
                }
            }
            PixelLayout::Mjpeg => match image::load_from_memory(&buf) {
                Ok(image) => Grab::Frame(Frame::from_image(image.into_rgb8(), self.frame_count)),
                Err(err) => Grab::Corrupt(format!("decode mjpeg: {}", err)),
            },
        };
        Ok(capture)
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        self.device_path.clone()
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let device = self.device_path.clone();
        let frame = skip_corrupt(&device, || self.read_once())?;
        self.frame_count += 1;
        Ok(frame)
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
