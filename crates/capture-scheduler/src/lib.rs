//! Capture Loop Scheduler
//!
//! Samples the latest camera frame at a fixed cadence, encodes it, and hands
//! it to the transport, but only while the transport is open. A slow or
//! closed channel turns ticks into cheap no-ops instead of a backlog.

mod scheduler;

pub use scheduler::{tick, CaptureScheduler, CaptureStats, CaptureTarget, TickOutcome, DEFAULT_TARGET_FPS};
