//! Drowsiness Monitor
//!
//! Wires the camera, capture loop, transport, and alerting into a monitoring
//! session, plus the settings and logging the binary needs.

mod error;
mod logging;
mod oneshot;
mod session;
mod settings;

pub use error::SessionError;
pub use logging::{init_logging, install_metrics};
pub use oneshot::{analyze_once, OneShotReport};
pub use session::{spawn_status_observer, CaptureSession, SessionOptions, TeardownReport, Transport};
pub use settings::{
    CaptureSettings, LoggingSettings, ServerSettings, Settings, TransportMode, TransportSettings,
};

use std::sync::Arc;

use alerting::AlertRenderer;
use analysis_protocol::AnalysisClient;
use camera_capture::{SourceSpec, StillImageSource};
use tracing::info;

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            target_fps: settings.capture.target_fps,
            jpeg_quality: settings.capture.jpeg_quality,
            transport: settings.transport_config(),
            poll_interval: settings.poll_interval(),
            alerts: settings.alerts.clone(),
        }
    }
}

/// Start a session in the configured transport mode
pub async fn start_session(
    settings: &Settings,
    renderer: Arc<dyn AlertRenderer>,
) -> Result<CaptureSession, SessionError> {
    let options = SessionOptions::from_settings(settings);

    match settings.transport.mode {
        TransportMode::Poll => {
            let client = AnalysisClient::new(&settings.server.base_url)?;
            CaptureSession::start_polling(client, &options, renderer).await
        }
        TransportMode::Stream => {
            let endpoint = settings.stream_endpoint()?;
            let spec: SourceSpec = settings.capture.source.parse()?;
            info!("Streaming {} to {}", settings.capture.source, endpoint);

            match spec {
                SourceSpec::Still(path) => {
                    // Replay faster than the capture cadence so every tick has a fresh frame.
                    let source = StillImageSource::from_path(path, options.target_fps.saturating_mul(2));
                    CaptureSession::start_streaming(source, &endpoint, &options, renderer).await
                }
                SourceSpec::V4l(index) => start_v4l(index, &endpoint, &options, renderer).await,
            }
        }
    }
}

#[cfg(feature = "v4l")]
async fn start_v4l(
    index: usize,
    endpoint: &str,
    options: &SessionOptions,
    renderer: Arc<dyn AlertRenderer>,
) -> Result<CaptureSession, SessionError> {
    let source = camera_capture::V4lCamera::new(index, camera_capture::CameraConfig::default());
    CaptureSession::start_streaming(source, endpoint, options, renderer).await
}

#[cfg(not(feature = "v4l"))]
async fn start_v4l(
    index: usize,
    _endpoint: &str,
    _options: &SessionOptions,
    _renderer: Arc<dyn AlertRenderer>,
) -> Result<CaptureSession, SessionError> {
    Err(camera_capture::CameraError::DeviceUnavailable(format!(
        "v4l:{} requested but built without the `v4l` feature",
        index
    ))
    .into())
}
