//! Capture Scheduler Implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camera_capture::{FrameEncoder, FrameReader};
use stream_transport::{ConnectionState, FrameSink, SendOutcome};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default capture cadence
pub const DEFAULT_TARGET_FPS: u32 = 10;

/// Everything one capture loop reads from and writes to
pub struct CaptureTarget<E, S> {
    /// Latest frame from the media source
    pub frames: FrameReader,
    /// Frame encoder (fixed format and quality)
    pub encoder: Arc<E>,
    /// Transport receiving encoded frames
    pub sink: Arc<S>,
}

impl<E, S> Clone for CaptureTarget<E, S> {
    fn clone(&self) -> Self {
        Self {
            frames: self.frames.clone(),
            encoder: self.encoder.clone(),
            sink: self.sink.clone(),
        }
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame encoded and handed to the transport
    Sent,
    /// Transport not open; nothing captured
    SkippedNotOpen,
    /// Source has not produced a usable frame yet
    SkippedNoFrame,
    /// Encoding failed; retried on the next tick
    EncodeFailed,
    /// Transport still busy with the previous frame
    Dropped,
}

impl TickOutcome {
    fn reason(&self) -> &'static str {
        match self {
            TickOutcome::Sent => "sent",
            TickOutcome::SkippedNotOpen => "not_open",
            TickOutcome::SkippedNoFrame => "no_frame",
            TickOutcome::EncodeFailed => "encode_failed",
            TickOutcome::Dropped => "busy",
        }
    }
}

/// Counters for one scheduler
#[derive(Debug, Default)]
pub struct CaptureStats {
    ticks: AtomicU64,
    sent: AtomicU64,
    skipped: AtomicU64,
    encode_failures: AtomicU64,
}

impl CaptureStats {
    fn record(&self, outcome: TickOutcome) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        match outcome {
            TickOutcome::Sent => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            TickOutcome::EncodeFailed => {
                self.encode_failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        if outcome != TickOutcome::Sent {
            metrics::counter!("frames_skipped_total", "reason" => outcome.reason()).increment(1);
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn encode_failures(&self) -> u64 {
        self.encode_failures.load(Ordering::Relaxed)
    }
}

/// Run one capture tick.
///
/// Skips with no side effect unless the transport is open and the source
/// has a frame with non-zero dimensions. Otherwise encodes exactly one
/// snapshot and submits it.
pub async fn tick<E: FrameEncoder, S: FrameSink>(target: &CaptureTarget<E, S>) -> TickOutcome {
    if target.sink.state() != ConnectionState::Open {
        return TickOutcome::SkippedNotOpen;
    }

    let Some(frame) = target.frames.latest() else {
        return TickOutcome::SkippedNoFrame;
    };

    let encoder = target.encoder.clone();
    let sequence = frame.sequence;
    let payload = match tokio::task::spawn_blocking(move || encoder.encode(&frame)).await {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            warn!("Skipping frame {}: {}", sequence, e);
            return TickOutcome::EncodeFailed;
        }
        Err(e) => {
            warn!("Encode task for frame {} aborted: {}", sequence, e);
            return TickOutcome::EncodeFailed;
        }
    };

    match target.sink.send(payload) {
        SendOutcome::Sent => TickOutcome::Sent,
        SendOutcome::NotOpen => TickOutcome::SkippedNotOpen,
        SendOutcome::Busy => TickOutcome::Dropped,
    }
}

/// Timer-driven capture loop
pub struct CaptureScheduler {
    /// Running loop, if started
    task: Option<JoinHandle<()>>,
    /// Tick counters
    stats: Arc<CaptureStats>,
}

impl CaptureScheduler {
    /// Create a stopped scheduler
    pub fn new() -> Self {
        Self {
            task: None,
            stats: Arc::new(CaptureStats::default()),
        }
    }

    /// Tick period for a target frame rate, never shorter than 1ms
    pub fn period(target_fps: u32) -> Duration {
        Duration::from_millis((1000 / u64::from(target_fps.max(1))).max(1))
    }

    /// Start ticking at `target_fps`. Ignored if already running.
    pub fn start<E: FrameEncoder, S: FrameSink>(&mut self, target: CaptureTarget<E, S>, target_fps: u32) {
        if self.is_running() {
            warn!("Capture scheduler already running");
            return;
        }

        let period = Self::period(target_fps);
        info!("Starting capture loop at {} fps ({:?} period)", target_fps, period);

        let stats = self.stats.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let outcome = tick(&target).await;
                debug!("Capture tick: {:?}", outcome);
                stats.record(outcome);
            }
        }));
    }

    /// Cancel the timer. Safe to call when stopped.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            info!(
                "Stopping capture loop ({} ticks, {} frames sent)",
                self.stats.ticks(),
                self.stats.sent()
            );
            task.abort();
        }
    }

    /// Whether the timer is live
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Tick counters
    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }
}

impl Default for CaptureScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
