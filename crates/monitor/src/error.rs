//! Session error types

use analysis_protocol::ProtocolError;
use camera_capture::CameraError;
use stream_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Media source could not be acquired; fatal to the session
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Analyzer error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Background task failed: {0}")]
    Task(String),
}
