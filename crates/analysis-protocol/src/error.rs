//! Protocol Error Types

use thiserror::Error;

/// Errors raised while decoding analyzer messages or calling its HTTP API
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound payload could not be parsed as an analysis result
    #[error("Malformed analysis message: {0}")]
    MalformedMessage(String),

    /// One-shot request failed; `status` is 0 when no HTTP response arrived
    #[error("Analysis request failed ({status}): {message}")]
    AnalysisRequestFailed { status: u16, message: String },

    /// Base URL rejected before any request was made
    #[error("Invalid analyzer URL: {0}")]
    InvalidUrl(String),
}

impl ProtocolError {
    /// HTTP status carried by a failed request, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ProtocolError::AnalysisRequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::MalformedMessage(err.to_string())
    }
}

impl From<reqwest::Error> for ProtocolError {
    fn from(err: reqwest::Error) -> Self {
        ProtocolError::AnalysisRequestFailed {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: format!("Network error: {}", err),
        }
    }
}
