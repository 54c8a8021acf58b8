//! Video frame types

use std::time::{SystemTime, UNIX_EPOCH};

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the Unix epoch)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Solid-color frame, mostly useful for tests and placeholders
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(rgb_len(width, height))
            .collect();
        Self::new(data, width, height, now_ns(), 0)
    }

    /// Decode a JPEG (e.g. an MJPEG camera buffer) into RGB
    pub fn from_jpeg(jpeg: &[u8], sequence: u32) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)?;
        Ok(Self::from_image(img, sequence))
    }

    /// Convert any decoded image into an RGB frame
    pub fn from_image(img: image::DynamicImage, sequence: u32) -> Self {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height, now_ns(), sequence)
    }

    /// Frame dimensions (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// A frame with a zero dimension carries no picture yet
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel buffer length matches the dimensions
    pub fn is_consistent(&self) -> bool {
        self.data.len() == rgb_len(self.width, self.height)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data.get(idx..idx + 3).map(|p| [p[0], p[1], p[2]])
    }

    /// Copy of this frame stamped as a fresh capture
    pub fn restamped(&self, sequence: u32) -> Self {
        Self {
            timestamp_ns: now_ns(),
            sequence,
            ..self.clone()
        }
    }
}

/// RGB24 buffer length for the given dimensions
fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
