//! Capture session lifecycle
//!
//! A session owns the camera device, the capture timer, the transport, and
//! the alert debouncer for one monitoring attempt. Teardown releases all of
//! them unconditionally.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alerting::{AlertDebouncer, AlertRenderer, DebounceConfig};
use analysis_protocol::{AnalysisClient, AnalysisResult};
use camera_capture::{CameraDevice, JpegEncoder, MediaSource};
use capture_scheduler::{CaptureScheduler, CaptureStats, CaptureTarget};
use stream_transport::{ConnectionState, StatusPoller, StreamClient, TransportConfig};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;

/// Session tuning, usually derived from `Settings`
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub target_fps: u32,
    pub jpeg_quality: u8,
    pub transport: TransportConfig,
    /// Polling mode only
    pub poll_interval: Duration,
    pub alerts: DebounceConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            target_fps: capture_scheduler::DEFAULT_TARGET_FPS,
            jpeg_quality: JpegEncoder::DEFAULT_QUALITY,
            transport: TransportConfig::default(),
            poll_interval: Duration::from_millis(500),
            alerts: DebounceConfig::default(),
        }
    }
}

/// The session's single transport
pub enum Transport {
    Stream(Arc<StreamClient>),
    Poll(Arc<StatusPoller>),
}

impl Transport {
    pub fn state(&self) -> ConnectionState {
        match self {
            Transport::Stream(client) => client.state(),
            Transport::Poll(poller) => poller.state(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        match self {
            Transport::Stream(client) => client.subscribe(),
            Transport::Poll(poller) => poller.subscribe(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        match self {
            Transport::Stream(client) => client.last_error(),
            Transport::Poll(poller) => poller.last_error(),
        }
    }

    fn close(&self) {
        match self {
            Transport::Stream(client) => client.close(),
            Transport::Poll(poller) => poller.close(),
        }
    }

    async fn wait_closed(&self) {
        match self {
            Transport::Stream(client) => client.wait_closed().await,
            Transport::Poll(poller) => poller.wait_closed().await,
        }
    }
}

/// What teardown managed to release
#[derive(Debug, Clone)]
pub struct TeardownReport {
    pub timer_stopped: bool,
    pub transport_state: ConnectionState,
    /// True also when the session never held a device
    pub device_released: bool,
    /// Failures hit along the way; teardown carries on past each
    pub errors: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One live monitoring attempt
pub struct CaptureSession {
    device: Option<CameraDevice>,
    scheduler: CaptureScheduler,
    transport: Transport,
    alerts_enabled: watch::Sender<bool>,
    latest: watch::Receiver<Option<AnalysisResult>>,
    consumer: Option<JoinHandle<()>>,
    /// Pending `open`, resolved to the state it reached
    connector: Option<JoinHandle<ConnectionState>>,
}

impl CaptureSession {
    /// Acquire `source`, start capturing, and connect to `endpoint` in the
    /// background.
    ///
    /// Returns once the device is acquired; ticks are skipped until the
    /// transport is `Open`. Use [`CaptureSession::wait_connected`] to learn
    /// how the connect attempt ended. Only a camera failure aborts startup.
    /// A failed connection leaves the session running with the transport in
    /// `Failed`, so the caller can surface it and decide whether to start a
    /// new session.
    pub async fn start_streaming<M: MediaSource>(
        source: M,
        endpoint: &str,
        options: &SessionOptions,
        renderer: Arc<dyn AlertRenderer>,
    ) -> Result<Self, SessionError> {
        let device = tokio::task::spawn_blocking(move || CameraDevice::acquire(source))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))??;

        let (client, results) = StreamClient::new(options.transport.clone());
        let client = Arc::new(client);

        let mut session = Self::assemble(
            Transport::Stream(client.clone()),
            Some(device),
            results,
            options,
            renderer,
        );

        if let Some(device) = &session.device {
            let target = CaptureTarget {
                frames: device.frames(),
                encoder: Arc::new(JpegEncoder::new(options.jpeg_quality)),
                sink: client.clone(),
            };
            session.scheduler.start(target, options.target_fps);
        }

        let endpoint = endpoint.to_string();
        session.connector = Some(tokio::spawn(async move {
            let state = client.open(&endpoint).await;
            if state != ConnectionState::Open {
                warn!(
                    "Analyzer stream not open ({}): {}",
                    state,
                    client.last_error().unwrap_or_else(|| "no detail".to_string())
                );
            }
            state
        }));

        record_session_started("stream");
        Ok(session)
    }

    /// Poll the analyzer's own camera status. No device, no capture timer.
    pub async fn start_polling(
        client: AnalysisClient,
        options: &SessionOptions,
        renderer: Arc<dyn AlertRenderer>,
    ) -> Result<Self, SessionError> {
        let (poller, results) = StatusPoller::new(
            client,
            options.poll_interval,
            options.transport.inbound_capacity,
        );
        let poller = Arc::new(poller);

        let mut session = Self::assemble(Transport::Poll(poller.clone()), None, results, options, renderer);

        session.connector = Some(tokio::spawn(async move {
            let state = poller.open().await;
            if state != ConnectionState::Open {
                warn!(
                    "Analyzer polling not open ({}): {}",
                    state,
                    poller.last_error().unwrap_or_else(|| "no detail".to_string())
                );
            }
            state
        }));

        record_session_started("poll");
        Ok(session)
    }

    fn assemble(
        transport: Transport,
        device: Option<CameraDevice>,
        results: mpsc::Receiver<AnalysisResult>,
        options: &SessionOptions,
        renderer: Arc<dyn AlertRenderer>,
    ) -> Self {
        let (alerts_enabled, enabled_rx) = watch::channel(options.alerts.enabled);
        let (latest_tx, latest) = watch::channel(None);
        let debouncer = AlertDebouncer::new(&options.alerts);

        let consumer = tokio::spawn(consume_results(results, debouncer, enabled_rx, latest_tx, renderer));

        Self {
            device,
            scheduler: CaptureScheduler::new(),
            transport,
            alerts_enabled,
            latest,
            consumer: Some(consumer),
            connector: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Observe transport state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.transport.last_error()
    }

    /// Wait until the connect attempt settles in `Open`, `Failed` or `Closed`
    pub async fn wait_connected(&self) -> ConnectionState {
        let mut state = self.subscribe_state();
        loop {
            let current = *state.borrow_and_update();
            if !matches!(current, ConnectionState::Idle | ConnectionState::Connecting) {
                return current;
            }
            if state.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Most recent analysis result
    pub fn latest(&self) -> Option<AnalysisResult> {
        self.latest.borrow().clone()
    }

    /// Observe analysis results as they arrive
    pub fn subscribe_results(&self) -> watch::Receiver<Option<AnalysisResult>> {
        self.latest.clone()
    }

    /// Enable or disable alert playback without losing edge history
    pub fn set_alerts_enabled(&self, enabled: bool) {
        self.alerts_enabled.send_replace(enabled);
    }

    pub fn alerts_enabled(&self) -> bool {
        *self.alerts_enabled.borrow()
    }

    pub fn capture_stats(&self) -> Arc<CaptureStats> {
        self.scheduler.stats()
    }

    pub fn has_device(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_active())
    }

    /// Stop the timer, close the transport, and release the device.
    ///
    /// Every step runs even when an earlier one fails.
    pub async fn teardown(mut self) -> TeardownReport {
        info!("Tearing down capture session");
        let mut errors = Vec::new();

        self.scheduler.stop();
        let timer_stopped = !self.scheduler.is_running();

        self.transport.close();
        if let Some(connector) = self.connector.take() {
            if let Err(e) = connector.await {
                error!("Connect task failed: {}", e);
                errors.push(e.to_string());
            }
        }
        self.transport.wait_closed().await;
        let transport_state = self.transport.state();
        if transport_state != ConnectionState::Closed {
            errors.push(format!("transport left in {}", transport_state));
        }

        let device_released = match self.device.take() {
            None => true,
            Some(mut device) => match tokio::task::spawn_blocking(move || device.release()).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    error!("Camera release failed: {}", e);
                    errors.push(e.to_string());
                    true
                }
                Err(e) => {
                    error!("Camera release task failed: {}", e);
                    errors.push(e.to_string());
                    false
                }
            },
        };

        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }

        info!(
            "Session closed (timer stopped: {}, transport: {}, device released: {})",
            timer_stopped, transport_state, device_released
        );
        let report = TeardownReport {
            timer_stopped,
            transport_state,
            device_released,
            errors,
        };
        record_teardown(&report);
        report
    }
}

fn record_session_started(mode: &'static str) {
    metrics::counter!("sessions_started_total", "mode" => mode).increment(1);
}

fn record_teardown(report: &TeardownReport) {
    metrics::counter!("sessions_closed_total").increment(1);
    if !report.is_clean() {
        metrics::counter!("session_teardown_errors_total").increment(report.errors.len() as u64);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.scheduler.stop();
        self.transport.close();
        if let Some(connector) = self.connector.take() {
            connector.abort();
        }
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }
    }
}

/// Single consumer of the result queue: debouncer, renderer, latest value
async fn consume_results(
    mut results: mpsc::Receiver<AnalysisResult>,
    mut debouncer: AlertDebouncer,
    mut enabled: watch::Receiver<bool>,
    latest: watch::Sender<Option<AnalysisResult>>,
    renderer: Arc<dyn AlertRenderer>,
) {
    while let Some(result) = results.recv().await {
        let alerts_on = *enabled.borrow_and_update();
        debouncer.set_enabled(alerts_on);

        if let Some(kind) = debouncer.observe(&result, Instant::now()) {
            renderer.render(kind.pattern());
        }
        latest.send_replace(Some(result));
    }
    debug!("Result queue closed; alert consumer exiting");
}

/// Log connection changes and each result's classification until the
/// session goes away
pub fn spawn_status_observer(session: &CaptureSession) -> JoinHandle<()> {
    let mut state = session.subscribe_state();
    let mut results = session.subscribe_results();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *state.borrow_and_update();
                    info!("Analyzer connection: {}", current);
                }
                changed = results.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let latest = results.borrow_and_update().clone();
                    if let Some(result) = latest {
                        debug!(
                            "Status {} | EAR {:.3}{} | MAR {:.3}{}",
                            result.status().as_str(),
                            result.ear,
                            if result.eyes_closed() { " (eyes closed)" } else { "" },
                            result.mar,
                            if result.mouth_open() { " (mouth open)" } else { "" },
                        );
                    }
                }
            }
        }
    })
}
