//! HTTP polling fallback transport
//!
//! Degraded mode for deployments where the analyzer cannot hold a duplex
//! channel: the analyzer captures frames itself and this transport polls its
//! `/status` endpoint. No frames are sent.

use std::sync::Mutex;
use std::time::Duration;

use analysis_protocol::{AnalysisClient, AnalysisResult, ProtocolError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::state::{wait_until_not_open, StateCell};
use crate::{ConnectionState, TransportError};

/// Polls analyzer status on a fixed interval
pub struct StatusPoller {
    client: AnalysisClient,
    interval: Duration,
    state: StateCell,
    results_tx: mpsc::Sender<AnalysisResult>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusPoller {
    /// Create an idle poller and the receiver its results are delivered to
    pub fn new(
        client: AnalysisClient,
        interval: Duration,
        inbound_capacity: usize,
    ) -> (Self, mpsc::Receiver<AnalysisResult>) {
        let (results_tx, results_rx) = mpsc::channel(inbound_capacity.max(1));
        let poller = Self {
            client,
            interval: interval.max(Duration::from_millis(10)),
            state: StateCell::new(),
            results_tx,
            task: Mutex::new(None),
        };
        (poller, results_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.last_error()
    }

    /// Check analyzer health, then start polling
    pub async fn open(&self) -> ConnectionState {
        if !self.state.transition(ConnectionState::Connecting) {
            warn!("open() ignored: poller is {}", self.state());
            return self.state();
        }

        info!("Polling analyzer status at {} every {:?}", self.client.base_url(), self.interval);
        if let Err(e) = self.client.health().await {
            let err = TransportError::from(e);
            error!("Analyzer health check failed: {}", err);
            self.state.record_error(err.to_string());
            self.state.transition(ConnectionState::Failed);
            return self.state();
        }

        if !self.state.transition(ConnectionState::Open) {
            return self.state();
        }

        let task = tokio::spawn(poll_loop(
            self.client.clone(),
            self.interval,
            self.results_tx.clone(),
            self.state.clone(),
        ));
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        ConnectionState::Open
    }

    /// Stop polling. Idempotent.
    pub fn close(&self) {
        if self.state.transition(ConnectionState::Closed) {
            info!("Status polling stopped");
        }
    }

    /// Wait for the polling task to finish after `close()`
    pub async fn wait_closed(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Polling task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.close();
    }
}

async fn poll_loop(
    client: AnalysisClient,
    period: Duration,
    results: mpsc::Sender<AnalysisResult>,
    state: StateCell,
) {
    let mut state_rx = state.subscribe();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_until_not_open(&mut state_rx) => break,
        }

        let polled = tokio::select! {
            polled = client.status() => polled,
            _ = wait_until_not_open(&mut state_rx) => break,
        };

        match polled {
            Ok(result) => {
                if results.send(result).await.is_err() {
                    debug!("Result consumer gone; stopping poller");
                    break;
                }
            }
            Err(ProtocolError::MalformedMessage(e)) => {
                warn!("Dropping status response: {}", e);
                metrics::counter!("messages_malformed_total").increment(1);
            }
            Err(e) => {
                let err = TransportError::from(e);
                error!("Status poll failed: {}", err);
                state.record_error(err.to_string());
                state.transition(ConnectionState::Failed);
                break;
            }
        }
    }
}
