//! Still image replayed as a live source

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::device::{FrameStream, MediaSource};
use crate::frame::VideoFrame;
use crate::CameraError;

/// Replays one image at a fixed frame rate
#[derive(Debug, Clone)]
pub struct StillImageSource {
    origin: Origin,
    fps: u32,
}

#[derive(Debug, Clone)]
enum Origin {
    Path(PathBuf),
    Frame(VideoFrame),
}

impl StillImageSource {
    /// Load the image from `path` when the source is opened
    pub fn from_path(path: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            origin: Origin::Path(path.into()),
            fps: fps.max(1),
        }
    }

    /// Replay an already decoded frame
    pub fn from_frame(frame: VideoFrame, fps: u32) -> Self {
        Self {
            origin: Origin::Frame(frame),
            fps: fps.max(1),
        }
    }
}

impl MediaSource for StillImageSource {
    type Stream = StillImageStream;

    fn describe(&self) -> String {
        match &self.origin {
            Origin::Path(path) => format!("still:{}", path.display()),
            Origin::Frame(frame) => format!("still:<{}x{}>", frame.width, frame.height),
        }
    }

    fn open(self) -> Result<StillImageStream, CameraError> {
        let frame = match self.origin {
            Origin::Path(path) => {
                let img = image::open(&path).map_err(|e| {
                    CameraError::DeviceUnavailable(format!("{}: {}", path.display(), e))
                })?;
                VideoFrame::from_image(img, 0)
            }
            Origin::Frame(frame) => frame,
        };

        if frame.is_empty() || !frame.is_consistent() {
            return Err(CameraError::Format(format!(
                "unusable still image {}x{}",
                frame.width, frame.height
            )));
        }

        info!("Replaying {}x{} still image at {} fps", frame.width, frame.height, self.fps);
        Ok(StillImageStream {
            frame,
            interval: Duration::from_micros(1_000_000 / self.fps as u64),
            next_due: Instant::now(),
            sequence: 0,
        })
    }
}

/// Open still-image stream
pub struct StillImageStream {
    frame: VideoFrame,
    interval: Duration,
    next_due: Instant,
    sequence: u32,
}

impl FrameStream for StillImageStream {
    fn next_frame(&mut self) -> Result<VideoFrame, CameraError> {
        let now = Instant::now();
        if self.next_due > now {
            thread::sleep(self.next_due - now);
        }
        self.next_due += self.interval;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(self.frame.restamped(self.sequence))
    }

    fn close(self) -> Result<(), CameraError> {
        Ok(())
    }
}
