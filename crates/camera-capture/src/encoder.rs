//! Frame encoding for network transport

use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ExtendedColorType;

use crate::frame::VideoFrame;
use crate::CameraError;

/// Compresses a raw frame into a transport payload
pub trait FrameEncoder: Send + Sync + 'static {
    fn encode(&self, frame: &VideoFrame) -> Result<Vec<u8>, CameraError>;
}

/// Lossy JPEG encoder at a fixed quality
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// Quality factor used for streamed frames (≈0.7)
    pub const DEFAULT_QUALITY: u8 = 70;

    /// Create an encoder; quality is clamped to 1-100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUALITY)
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&self, frame: &VideoFrame) -> Result<Vec<u8>, CameraError> {
        if frame.is_empty() {
            return Err(CameraError::Encode("frame has no pixels".into()));
        }
        if !frame.is_consistent() {
            return Err(CameraError::Encode(format!(
                "buffer of {} bytes does not match {}x{} RGB",
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }

        let mut out = Vec::with_capacity(frame.data.len() / 8);
        {
            let mut encoder = ImageJpegEncoder::new_with_quality(&mut out, self.quality);
            encoder
                .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
                .map_err(|e| CameraError::Encode(e.to_string()))?;
        }
        Ok(out)
    }
}
