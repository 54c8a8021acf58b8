//! Drowsiness Analyzer Protocol
//!
//! Data model and wire format shared by every path that talks to the remote
//! analyzer: the streaming channel (one JSON object per message) and the
//! plain HTTP endpoints (`/analyze`, `/status`, `/health`).

mod client;
mod error;
mod result;

pub use client::{AnalysisClient, Thresholds};
pub use error::ProtocolError;
pub use result::{decode_message, AnalysisResult, DetectionStatus, SignalState};

/// Display thresholds used by the analyzer's reference configuration
pub mod thresholds {
    /// Eye-aspect-ratio below which the eyes are shown as closed
    pub const EAR: f64 = 0.25;
    /// Mouth-aspect-ratio above which the mouth is shown as open
    pub const MAR: f64 = 0.70;
}
