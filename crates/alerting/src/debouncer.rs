//! Alert Debouncer Implementation

use std::time::{Duration, Instant};

use analysis_protocol::{AnalysisResult, SignalState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cooldown::CooldownGate;
use crate::pattern::AlertKind;

/// Debouncer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Minimum time between two fired alerts of any kind (default: 2000)
    pub cooldown_ms: u64,
    /// Whether alerts fire at all
    pub enabled: bool,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 2000,
            enabled: true,
        }
    }
}

impl DebounceConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Edge detector with cooldown gating.
///
/// Owns the previously observed flag pair and the cooldown gate. Every
/// `observe` call commits the observed flags, whether or not an alert
/// fires, so a sustained condition fires once and only a fresh rising edge
/// can fire again.
#[derive(Debug)]
pub struct AlertDebouncer {
    previous: SignalState,
    gate: CooldownGate,
    enabled: bool,
    last_alert: Option<AlertKind>,
}

impl AlertDebouncer {
    pub fn new(config: &DebounceConfig) -> Self {
        Self::with_gate(CooldownGate::new(config.cooldown()), config.enabled)
    }

    /// Build around an existing cooldown gate
    pub fn with_gate(gate: CooldownGate, enabled: bool) -> Self {
        debug!("Alert debouncer ready (cooldown {:?}, enabled: {})", gate.window(), enabled);
        Self {
            previous: SignalState::default(),
            gate,
            enabled,
            last_alert: None,
        }
    }

    /// Feed one analysis result; returns the alert to play, if any
    pub fn observe(&mut self, result: &AnalysisResult, now: Instant) -> Option<AlertKind> {
        let current = result.signals();
        let candidate = AlertKind::rising_edge(self.previous, current);
        self.previous = current;

        let kind = candidate?;

        if !self.enabled {
            debug!("Alert {} consumed while alerts are disabled", kind);
            return None;
        }

        if !self.gate.try_acquire(now) {
            debug!("Alert {} suppressed by cooldown", kind);
            metrics::counter!("alerts_suppressed_total").increment(1);
            return None;
        }

        info!("Alert fired: {} (ear {:.3}, mar {:.3})", kind, result.ear, result.mar);
        metrics::counter!("alerts_fired_total", "kind" => kind.as_str()).increment(1);
        self.last_alert = Some(kind);
        Some(kind)
    }

    /// Turn firing on or off. Observed flags are kept either way, so the
    /// toggle itself never produces an edge.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!("Alerts {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flags from the most recent observation
    pub fn previous(&self) -> SignalState {
        self.previous
    }

    pub fn last_alert(&self) -> Option<AlertKind> {
        self.last_alert
    }

    pub fn last_alert_at(&self) -> Option<Instant> {
        self.gate.last_fired()
    }
}

impl Default for AlertDebouncer {
    fn default() -> Self {
        Self::new(&DebounceConfig::default())
    }
}
