//! Camera Capture Library
//!
//! Acquires a live video source and keeps its most recent frame available
//! to the capture loop:
//! - `MediaSource` / `FrameStream` capability traits (open, read, release)
//! - `CameraDevice` handle owning the capture thread
//! - `JpegEncoder` for compact transport payloads
//!
//! Sources: still image replay, and V4L2 cameras with the `v4l` feature.

pub mod device;
pub mod encoder;
pub mod frame;
pub mod still;
#[cfg(feature = "v4l")]
pub mod v4l_camera;

pub use device::{CameraDevice, FrameReader, FrameStream, MediaSource};
pub use encoder::{FrameEncoder, JpegEncoder};
pub use frame::VideoFrame;
pub use still::StillImageSource;
#[cfg(feature = "v4l")]
pub use v4l_camera::V4lCamera;

use std::str::FromStr;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    /// Permission denied, no device present, or source missing
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    /// A single frame could not be encoded
    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Camera not initialized")]
    NotInitialized,
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Requested capture width
    pub width: u32,
    /// Requested capture height
    pub height: u32,
    /// Rate at which the source produces frames
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
        }
    }
}

/// Where frames come from, as written in configuration
///
/// `still:<path>` replays an image file; `v4l:<index>` opens `/dev/video<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Still(String),
    V4l(usize),
}

impl FromStr for SourceSpec {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("still", path)) if !path.is_empty() => Ok(SourceSpec::Still(path.to_string())),
            Some(("v4l", index)) => index
                .parse()
                .map(SourceSpec::V4l)
                .map_err(|_| CameraError::Format(format!("invalid V4L index '{}'", index))),
            _ => Err(CameraError::Format(format!(
                "unknown source '{}', expected still:<path> or v4l:<index>",
                s
            ))),
        }
    }
}
