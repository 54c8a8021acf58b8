//! Streaming Transport
//!
//! One persistent duplex connection per monitoring session:
//! - outbound: one encoded image per binary message, dropped unless `Open`
//! - inbound: JSON analysis results, delivered in arrival order through a
//!   single-consumer queue
//!
//! The transport never reconnects on its own; retry policy belongs to the
//! session owner. `StatusPoller` is a degraded fallback that polls the
//! analyzer's `/status` endpoint instead of streaming frames.

mod client;
mod poller;
mod state;

pub use client::{StreamClient, TransportConfig};
pub use poller::StatusPoller;
pub use state::ConnectionState;

use analysis_protocol::ProtocolError;
use thiserror::Error;

/// Transport error types
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Analyzer request failed: {0}")]
    Request(#[from] ProtocolError),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
            other => TransportError::ConnectionFailed(other.to_string()),
        }
    }
}

/// What happened to a payload handed to `FrameSink::send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the writer
    Sent,
    /// Channel not open; payload discarded
    NotOpen,
    /// Previous frame still in flight; payload discarded
    Busy,
}

/// Outbound side of a transport as seen by the capture loop
pub trait FrameSink: Send + Sync + 'static {
    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Transmit one encoded frame. Never blocks, never queues when not open.
    fn send(&self, payload: Vec<u8>) -> SendOutcome;
}
