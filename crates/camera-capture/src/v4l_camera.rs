//! V4L2 camera source (Linux)

use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::device::{FrameStream, MediaSource};
use crate::frame::{now_ns, VideoFrame};
use crate::{CameraConfig, CameraError};

const BUFFER_COUNT: u32 = 4;

/// Camera at `/dev/video<index>`
#[derive(Debug, Clone)]
pub struct V4lCamera {
    index: usize,
    config: CameraConfig,
}

impl V4lCamera {
    pub fn new(index: usize, config: CameraConfig) -> Self {
        Self { index, config }
    }
}

impl MediaSource for V4lCamera {
    type Stream = V4lStream;

    fn describe(&self) -> String {
        format!("/dev/video{}", self.index)
    }

    fn open(self) -> Result<V4lStream, CameraError> {
        let device = Device::new(self.index)
            .map_err(|e| CameraError::DeviceUnavailable(format!("{}: {}", self.describe(), e)))?;

        let mut format = device
            .format()
            .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = FourCC::new(b"MJPG");
        let format = device
            .set_format(&format)
            .map_err(|e| CameraError::Format(e.to_string()))?;

        let pixel = if format.fourcc == FourCC::new(b"MJPG") {
            Pixel::Mjpeg
        } else if format.fourcc == FourCC::new(b"YUYV") {
            Pixel::Yuyv
        } else {
            return Err(CameraError::Format(format!("unsupported fourcc {}", format.fourcc)));
        };

        if let Err(e) = device.set_params(&Parameters::with_fps(self.config.fps)) {
            warn!("Camera refused {} fps: {}", self.config.fps, e);
        }

        let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        info!(
            "Opened {} at {}x{} ({})",
            self.describe(),
            format.width,
            format.height,
            format.fourcc
        );

        Ok(V4lStream {
            _device: device,
            stream,
            pixel,
            width: format.width,
            height: format.height,
            sequence: 0,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Pixel {
    Mjpeg,
    Yuyv,
}

/// Streaming V4L2 device
pub struct V4lStream {
    _device: Device,
    stream: Stream<'static>,
    pixel: Pixel,
    width: u32,
    height: u32,
    sequence: u32,
}

impl FrameStream for V4lStream {
    fn next_frame(&mut self) -> Result<VideoFrame, CameraError> {
        let (buf, _meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::Stream(e.to_string()))?;
        self.sequence = self.sequence.wrapping_add(1);

        match self.pixel {
            Pixel::Mjpeg => VideoFrame::from_jpeg(buf, self.sequence)
                .map_err(|e| CameraError::Format(e.to_string())),
            Pixel::Yuyv => Ok(VideoFrame::new(
                yuyv_to_rgb(buf),
                self.width,
                self.height,
                now_ns(),
                self.sequence,
            )),
        }
    }

    fn close(self) -> Result<(), CameraError> {
        // Dropping the stream unmaps the buffers and stops streaming.
        drop(self.stream);
        Ok(())
    }
}

fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
    for chunk in yuyv.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }
    rgb
}
