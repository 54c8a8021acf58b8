//! Alert kinds and their audible patterns

use std::fmt;

use analysis_protocol::SignalState;
use serde::{Deserialize, Serialize};

/// Alerts the debouncer can fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Drowsy,
    Yawning,
    /// Drowsy and yawning at once
    Critical,
}

impl AlertKind {
    /// Rising edge between two consecutive samples, critical first
    pub fn rising_edge(previous: SignalState, current: SignalState) -> Option<AlertKind> {
        if current.is_critical() && !previous.is_critical() {
            Some(AlertKind::Critical)
        } else if current.drowsy && !previous.drowsy {
            Some(AlertKind::Drowsy)
        } else if current.yawning && !previous.yawning {
            Some(AlertKind::Yawning)
        } else {
            None
        }
    }

    pub fn pattern(&self) -> AlertPattern {
        match self {
            AlertKind::Drowsy => AlertPattern::Drowsy,
            AlertKind::Yawning => AlertPattern::Yawning,
            AlertKind::Critical => AlertPattern::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Drowsy => "drowsy",
            AlertKind::Yawning => "yawning",
            AlertKind::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named audible cues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPattern {
    Drowsy,
    Yawning,
    Critical,
    /// Played after a one-shot analysis that raised no alert
    Success,
}

/// One beep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u64,
    /// Gain in 0.0..=1.0
    pub volume: f32,
}

const fn tone(frequency_hz: u32, duration_ms: u64, volume: f32) -> Tone {
    Tone {
        frequency_hz,
        duration_ms,
        volume,
    }
}

/// Tones played back to back with a fixed silence between them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSequence {
    pub tones: &'static [Tone],
    pub gap_ms: u64,
}

impl ToneSequence {
    /// Wall time from the first tone's start to the last tone's end
    pub fn total_ms(&self) -> u64 {
        let sounding: u64 = self.tones.iter().map(|t| t.duration_ms).sum();
        let gaps = self.tones.len().saturating_sub(1) as u64 * self.gap_ms;
        sounding + gaps
    }
}

const DROWSY_TONES: [Tone; 3] = [tone(600, 150, 0.4), tone(600, 150, 0.4), tone(600, 150, 0.4)];
const YAWNING_TONES: [Tone; 2] = [tone(800, 200, 0.35), tone(800, 200, 0.35)];
const CRITICAL_TONES: [Tone; 3] = [tone(600, 150, 0.4), tone(800, 150, 0.45), tone(1000, 200, 0.5)];
const SUCCESS_TONES: [Tone; 2] = [tone(1000, 100, 0.3), tone(1200, 150, 0.3)];

impl AlertPattern {
    pub fn tones(&self) -> ToneSequence {
        match self {
            AlertPattern::Drowsy => ToneSequence {
                tones: &DROWSY_TONES,
                gap_ms: 150,
            },
            AlertPattern::Yawning => ToneSequence {
                tones: &YAWNING_TONES,
                gap_ms: 200,
            },
            AlertPattern::Critical => ToneSequence {
                tones: &CRITICAL_TONES,
                gap_ms: 100,
            },
            AlertPattern::Success => ToneSequence {
                tones: &SUCCESS_TONES,
                gap_ms: 100,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPattern::Drowsy => "drowsy",
            AlertPattern::Yawning => "yawning",
            AlertPattern::Critical => "critical",
            AlertPattern::Success => "success",
        }
    }
}

impl fmt::Display for AlertPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
