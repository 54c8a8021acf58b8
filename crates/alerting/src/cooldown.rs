//! Cooldown gate shared by all alert kinds

use std::time::{Duration, Instant};

/// Minimum spacing between fired alerts.
///
/// One gate is owned per debouncer, so independent sessions never share
/// cooldown state.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    window: Duration,
    last_fired: Option<Instant>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// When the gate last let an alert through
    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    /// Whether an alert at `now` would pass.
    ///
    /// A `now` earlier than the last fire counts as zero elapsed time.
    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        }
    }

    /// Pass an alert at `now`, recording it if the gate is open
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if !self.is_open(now) {
            return false;
        }
        self.last_fired = Some(now);
        true
    }
}
