//! Analysis results and their wire decoding

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::thresholds;

/// One analyzer verdict for a single image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Eye-aspect-ratio (roughly 0-1, low means closed)
    pub ear: f64,
    /// Mouth-aspect-ratio (roughly 0-1, may exceed 1)
    pub mar: f64,
    /// Sustained low EAR, computed by the analyzer
    pub drowsy: bool,
    /// Sustained high MAR, computed by the analyzer
    pub yawning: bool,
    /// Overlay image as a data URI; only present on one-shot responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
}

impl AnalysisResult {
    /// Create a result without an annotated image
    pub fn new(ear: f64, mar: f64, drowsy: bool, yawning: bool) -> Self {
        Self {
            ear,
            mar,
            drowsy,
            yawning,
            annotated_image: None,
        }
    }

    /// The boolean pair the alert debouncer tracks
    pub fn signals(&self) -> SignalState {
        SignalState {
            drowsy: self.drowsy,
            yawning: self.yawning,
        }
    }

    /// Overall status for display
    pub fn status(&self) -> DetectionStatus {
        match (self.drowsy, self.yawning) {
            (true, true) => DetectionStatus::Critical,
            (true, false) => DetectionStatus::Drowsy,
            (false, true) => DetectionStatus::Yawning,
            (false, false) => DetectionStatus::Normal,
        }
    }

    /// Eyes read as closed at the display threshold
    pub fn eyes_closed(&self) -> bool {
        self.ear < thresholds::EAR
    }

    /// Mouth reads as open at the display threshold
    pub fn mouth_open(&self) -> bool {
        self.mar > thresholds::MAR
    }
}

/// Drowsy/yawning flag pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalState {
    pub drowsy: bool,
    pub yawning: bool,
}

impl SignalState {
    pub fn new(drowsy: bool, yawning: bool) -> Self {
        Self { drowsy, yawning }
    }

    /// Both flags raised at once
    pub fn is_critical(&self) -> bool {
        self.drowsy && self.yawning
    }
}

/// Display status derived from the two flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStatus {
    Normal,
    Drowsy,
    Yawning,
    Critical,
}

impl DetectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStatus::Normal => "normal",
            DetectionStatus::Drowsy => "drowsy",
            DetectionStatus::Yawning => "yawning",
            DetectionStatus::Critical => "critical",
        }
    }

    /// Any flag raised
    pub fn is_alert(&self) -> bool {
        !matches!(self, DetectionStatus::Normal)
    }
}

/// Decode one inbound channel message.
///
/// The analyzer sends `{ear, mar, drowsy, yawning}`; unknown fields are
/// ignored, missing or mistyped ones are rejected.
pub fn decode_message(payload: &[u8]) -> Result<AnalysisResult, ProtocolError> {
    let result: AnalysisResult = serde_json::from_slice(payload)?;
    Ok(result)
}
