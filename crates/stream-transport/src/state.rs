//! Connection state machine

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info};

/// Lifecycle of one transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// Transitions happen only on `open`, `close`, remote close and remote
    /// error; `Closed` is terminal.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Closed)
                | (Connecting, Open)
                | (Connecting, Failed)
                | (Connecting, Closed)
                | (Open, Closed)
                | (Open, Failed)
                | (Failed, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state owned by one transport and its tasks; everyone else reads
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
    sender: Arc<watch::Sender<ConnectionState>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(ConnectionState::Idle);
        Self {
            sender: Arc::new(sender),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.sender.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.sender.subscribe()
    }

    /// Apply `next` if legal from the current state; returns whether it was applied
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        let mut previous = next;
        let applied = self.sender.send_if_modified(|state| {
            if state.can_transition_to(next) {
                previous = *state;
                *state = next;
                true
            } else {
                false
            }
        });

        if applied {
            info!("Transport {} -> {}", previous, next);
            metrics::counter!("transport_transitions_total", "state" => next.as_str()).increment(1);
        } else {
            debug!("Ignoring transport transition to {} from {}", next, self.get());
        }
        applied
    }

    /// Record why the connection failed or closed
    pub(crate) fn record_error(&self, message: String) {
        let mut slot = self.last_error.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(message);
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Resolves once the state is `Closed`, or when the owner is gone
pub(crate) async fn wait_until_closed(rx: &mut watch::Receiver<ConnectionState>) {
    loop {
        let current = *rx.borrow_and_update();
        if current == ConnectionState::Closed {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves once the state is anything but `Open`
pub(crate) async fn wait_until_not_open(rx: &mut watch::Receiver<ConnectionState>) {
    loop {
        let current = *rx.borrow_and_update();
        if current != ConnectionState::Open {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    const ALL: [ConnectionState; 5] = [Idle, Connecting, Open, Closed, Failed];

    #[test]
    fn test_closed_is_terminal() {
        for next in ALL {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_close_reachable_from_every_live_state() {
        for state in [Idle, Connecting, Open, Failed] {
            assert!(state.can_transition_to(Closed), "{} -> closed", state);
        }
    }

    #[test]
    fn test_open_only_via_connecting() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Open), state == Connecting);
        }
        assert!(!Failed.can_transition_to(Connecting));
        assert!(!Idle.can_transition_to(Failed));
    }

    #[test]
    fn test_cell_applies_legal_transitions_only() {
        let cell = StateCell::new();
        let rx = cell.subscribe();
        assert_eq!(cell.get(), Idle);

        assert!(!cell.transition(Open));
        assert!(cell.transition(Connecting));
        assert!(cell.transition(Open));
        assert!(cell.transition(Closed));
        assert!(!cell.transition(Failed));
        assert!(!cell.transition(Closed));
        assert_eq!(*rx.borrow(), Closed);
    }

    #[tokio::test]
    async fn test_waiters() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();
        cell.transition(Connecting);
        cell.transition(Open);

        let waiter = tokio::spawn(async move {
            wait_until_not_open(&mut rx).await;
            wait_until_closed(&mut rx).await;
        });
        cell.transition(Failed);
        cell.transition(Closed);
        waiter.await.unwrap();
    }

    #[test]
    fn test_last_error_recorded() {
        let cell = StateCell::new();
        assert!(cell.last_error().is_none());
        cell.record_error("refused".to_string());
        assert_eq!(cell.last_error().as_deref(), Some("refused"));
    }
}
