//! Media source acquisition and the capture thread
//!
//! A `MediaSource` is opened on a dedicated thread (device handles often
//! cannot move between threads once streaming), which then keeps reading
//! frames and publishing the most recent one. Consumers never queue frames:
//! they sample whatever is newest when they need it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::frame::VideoFrame;
use crate::CameraError;

/// Back-off after a failed read so a broken source does not spin
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// How long `release` waits for a read blocked inside the source
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

/// An acquirable video input
pub trait MediaSource: Send + 'static {
    /// Stream produced once the device is open
    type Stream: FrameStream;

    /// Human-readable source name for logs
    fn describe(&self) -> String;

    /// Acquire exclusive access to the device
    ///
    /// Fails with `CameraError::DeviceUnavailable` when permission is denied
    /// or no device is present.
    fn open(self) -> Result<Self::Stream, CameraError>;
}

/// An open device producing frames
pub trait FrameStream {
    /// Block until the next frame is available
    fn next_frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Release the physical device
    fn close(self) -> Result<(), CameraError>;
}

/// Read-only view of the latest captured frame
#[derive(Debug, Clone)]
pub struct FrameReader {
    receiver: watch::Receiver<Option<Arc<VideoFrame>>>,
}

impl FrameReader {
    /// Build a reader over an existing channel (used by custom sources and tests)
    pub fn new(receiver: watch::Receiver<Option<Arc<VideoFrame>>>) -> Self {
        Self { receiver }
    }

    /// Snapshot of the newest frame with non-zero dimensions
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.receiver
            .borrow()
            .as_ref()
            .filter(|frame| !frame.is_empty())
            .cloned()
    }

    /// Current frame dimensions, if a frame has been captured
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.latest().map(|frame| frame.dimensions())
    }
}

/// Handle to an acquired camera and its capture thread
pub struct CameraDevice {
    name: String,
    reader: FrameReader,
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    /// Close result, sent by the capture thread as it exits
    closed: std_mpsc::Receiver<Result<(), CameraError>>,
}

impl CameraDevice {
    /// Open `source` and start capturing.
    ///
    /// Returns once the device is open, or with the error that prevented it.
    pub fn acquire<S: MediaSource>(source: S) -> Result<Self, CameraError> {
        let name = source.describe();
        info!("Acquiring camera: {}", name);

        let (frame_tx, frame_rx) = watch::channel(None);
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (closed_tx, closed_rx) = std_mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let thread_name = name.clone();

        let thread = thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let mut stream = match source.open() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut failures: u32 = 0;
                while !shutdown_clone.load(Ordering::SeqCst) {
                    match stream.next_frame() {
                        Ok(frame) => {
                            failures = 0;
                            frame_tx.send_replace(Some(Arc::new(frame)));
                        }
                        Err(e) => {
                            failures += 1;
                            warn!("Frame read failed on {} (attempt {}): {}", thread_name, failures, e);
                            thread::sleep(READ_ERROR_BACKOFF);
                        }
                    }
                }

                debug!("Capture thread for {} stopping", thread_name);
                let _ = closed_tx.send(stream.close());
            })
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to acquire {}: {}", name, e);
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CameraError::DeviceUnavailable(format!(
                    "{} capture thread exited during open",
                    name
                )));
            }
        }

        info!("Camera {} acquired", name);
        Ok(Self {
            name,
            reader: FrameReader::new(frame_rx),
            shutdown,
            thread: Some(thread),
            closed: closed_rx,
        })
    }

    /// Source name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reader over the most recent frame
    pub fn frames(&self) -> FrameReader {
        self.reader.clone()
    }

    /// Dimensions of the most recent frame
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.reader.dimensions()
    }

    /// Whether the device is still held
    pub fn is_active(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop capturing and release the device. Safe to call more than once.
    pub fn release(&mut self) -> Result<(), CameraError> {
        self.release_within(RELEASE_TIMEOUT)
    }

    /// Release, waiting at most `limit` for the capture thread.
    ///
    /// A thread still stuck in a read after `limit` is detached and the
    /// handle counts as released; the source closes when the read returns.
    pub fn release_within(&mut self, limit: Duration) -> Result<(), CameraError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        info!("Releasing camera {}", self.name);
        self.shutdown.store(true, Ordering::SeqCst);
        match self.closed.recv_timeout(limit) {
            Ok(result) => {
                if thread.join().is_err() {
                    return Err(CameraError::Stream(format!("{} capture thread panicked", self.name)));
                }
                result
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!("Camera {} did not stop within {:?}; detaching", self.name, limit);
                Err(CameraError::Stream(format!(
                    "{} capture thread did not stop within {:?}",
                    self.name, limit
                )))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Err(CameraError::Stream(format!("{} capture thread panicked", self.name)))
            }
        }
    }
}

impl Drop for CameraDevice {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("Camera release failed: {}", e);
        }
    }
}
