//! WebSocket streaming client

use std::sync::Mutex;
use std::time::Duration;

use analysis_protocol::{decode_message, AnalysisResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::state::{wait_until_closed, wait_until_not_open, StateCell};
use crate::{ConnectionState, FrameSink, SendOutcome, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake when shutting down
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Streaming transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on the `Connecting` state; `None` waits until `close()`
    pub connect_timeout: Option<Duration>,
    /// Inbound results buffered for the consumer before reads pause
    pub inbound_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            inbound_capacity: 64,
        }
    }
}

/// Client owning one duplex connection to the analyzer
pub struct StreamClient {
    config: TransportConfig,
    state: StateCell,
    outbound_tx: mpsc::Sender<Vec<u8>>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    results_tx: mpsc::Sender<AnalysisResult>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamClient {
    /// Create an idle client and the receiver its results are delivered to
    pub fn new(config: TransportConfig) -> (Self, mpsc::Receiver<AnalysisResult>) {
        // One slot: a frame is either in flight or dropped.
        let (outbound_tx, outbound_rx) = mpsc::channel(1);
        let (results_tx, results_rx) = mpsc::channel(config.inbound_capacity.max(1));

        let client = Self {
            config,
            state: StateCell::new(),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            results_tx,
            tasks: Mutex::new(Vec::new()),
        };
        (client, results_rx)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Reason for the last failure or remote close, if any
    pub fn last_error(&self) -> Option<String> {
        self.state.last_error()
    }

    /// Connect to `endpoint` (e.g. "ws://localhost:8000/ws").
    ///
    /// Only valid from `Idle`; otherwise the current state is returned
    /// unchanged. Resolves to `Open`, `Failed`, or `Closed` when `close()`
    /// interrupts the attempt.
    pub async fn open(&self, endpoint: &str) -> ConnectionState {
        if !self.state.transition(ConnectionState::Connecting) {
            warn!("open() ignored: transport is {}", self.state());
            return self.state();
        }

        info!("Connecting to analyzer stream at {}", endpoint);
        let mut state_rx = self.state.subscribe();

        let attempt = async {
            match self.config.connect_timeout {
                Some(limit) => match tokio::time::timeout(limit, connect_async(endpoint)).await {
                    Ok(result) => result.map_err(TransportError::from),
                    Err(_) => Err(TransportError::ConnectTimeout(limit.as_millis() as u64)),
                },
                None => connect_async(endpoint).await.map_err(TransportError::from),
            }
        };

        let outcome = tokio::select! {
            outcome = attempt => outcome,
            _ = wait_until_closed(&mut state_rx) => {
                info!("Connect to {} abandoned by close()", endpoint);
                return ConnectionState::Closed;
            }
        };

        let ws = match outcome {
            Ok((ws, _response)) => ws,
            Err(e) => {
                error!("Failed to connect to {}: {}", endpoint, e);
                self.state.record_error(e.to_string());
                self.state.transition(ConnectionState::Failed);
                return self.state();
            }
        };

        let Some(outbound_rx) = self.take_outbound() else {
            self.state.record_error("outbound queue already consumed".to_string());
            self.state.transition(ConnectionState::Failed);
            return self.state();
        };

        if !self.state.transition(ConnectionState::Open) {
            // close() won the race; dropping the socket releases it.
            return self.state();
        }

        let (sink, stream) = ws.split();
        let writer = tokio::spawn(write_loop(sink, outbound_rx, self.state.clone()));
        let reader = tokio::spawn(read_loop(stream, self.results_tx.clone(), self.state.clone()));
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend([writer, reader]);

        ConnectionState::Open
    }

    /// Close the connection. Idempotent; valid from any state.
    pub fn close(&self) {
        if self.state.transition(ConnectionState::Closed) {
            info!("Analyzer stream closed");
        }
    }

    /// Wait for the connection tasks to finish after `close()`
    pub async fn wait_closed(&self) {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Transport task ended abnormally: {}", e);
            }
        }
    }

    fn take_outbound(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.outbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

impl FrameSink for StreamClient {
    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn send(&self, payload: Vec<u8>) -> SendOutcome {
        if self.state.get() != ConnectionState::Open {
            return SendOutcome::NotOpen;
        }
        match self.outbound_tx.try_send(payload) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Busy,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::NotOpen,
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.close();
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    state: StateCell,
) {
    let mut state_rx = state.subscribe();

    loop {
        tokio::select! {
            payload = outbound.recv() => {
                let Some(payload) = payload else { break };
                let size = payload.len();
                if let Err(e) = sink.send(Message::Binary(payload)).await {
                    let err = TransportError::from(e);
                    warn!("Frame send failed: {}", err);
                    state.record_error(err.to_string());
                    state.transition(ConnectionState::Failed);
                    break;
                }
                debug!("Sent frame ({} bytes)", size);
                metrics::counter!("frames_sent_total").increment(1);
            }
            _ = wait_until_not_open(&mut state_rx) => break,
        }
    }

    if state.get() == ConnectionState::Closed {
        match tokio::time::timeout(CLOSE_GRACE, sink.close()).await {
            Ok(Ok(())) => debug!("Close handshake sent"),
            Ok(Err(e)) => debug!("Close handshake failed: {}", e),
            Err(_) => debug!("Close handshake timed out"),
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    results: mpsc::Sender<AnalysisResult>,
    state: StateCell,
) {
    let mut state_rx = state.subscribe();

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = wait_until_not_open(&mut state_rx) => break,
        };

        match message {
            Some(Ok(Message::Text(text))) => deliver(text.as_bytes(), &results).await,
            Some(Ok(Message::Binary(data))) => deliver(&data, &results).await,
            Some(Ok(Message::Close(frame))) => {
                info!("Analyzer closed the stream: {:?}", frame);
                state.record_error(TransportError::ConnectionClosed.to_string());
                state.transition(ConnectionState::Closed);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let err = TransportError::from(e);
                error!("Analyzer stream error: {}", err);
                state.record_error(err.to_string());
                match err {
                    TransportError::ConnectionClosed => state.transition(ConnectionState::Closed),
                    _ => state.transition(ConnectionState::Failed),
                };
                break;
            }
            None => {
                info!("Analyzer stream ended");
                state.record_error(TransportError::ConnectionClosed.to_string());
                state.transition(ConnectionState::Closed);
                break;
            }
        }
    }
}

/// Parse and forward one inbound message; malformed input is dropped
async fn deliver(payload: &[u8], results: &mpsc::Sender<AnalysisResult>) {
    match decode_message(payload) {
        Ok(result) => {
            if results.send(result).await.is_err() {
                debug!("Result consumer gone; dropping analysis result");
            }
        }
        Err(e) => {
            warn!("Dropping inbound message: {}", e);
            metrics::counter!("messages_malformed_total").increment(1);
        }
    }
}
