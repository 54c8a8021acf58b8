//! Alert rendering

use std::io::Write;

use tracing::{debug, info};

use crate::pattern::AlertPattern;

/// Produces an audible cue for a named pattern.
///
/// Implementations must return promptly; they are called from the task that
/// consumes analysis results.
pub trait AlertRenderer: Send + Sync + 'static {
    fn render(&self, pattern: AlertPattern);
}

/// Terminal bell renderer: one BEL per tone plus a log line
#[derive(Debug, Clone, Default)]
pub struct TerminalRenderer {
    /// Suppress the bell and only log
    pub quiet: bool,
}

impl TerminalRenderer {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Bytes written to the terminal for `pattern`
    pub fn cue(pattern: AlertPattern) -> Vec<u8> {
        vec![0x07; pattern.tones().tones.len()]
    }
}

impl AlertRenderer for TerminalRenderer {
    fn render(&self, pattern: AlertPattern) {
        let sequence = pattern.tones();
        let tones: Vec<String> = sequence
            .tones
            .iter()
            .map(|t| format!("{}Hz/{}ms", t.frequency_hz, t.duration_ms))
            .collect();
        info!("Playing {} alert: {} (gap {}ms)", pattern, tones.join(" "), sequence.gap_ms);

        if self.quiet {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        if let Err(e) = stderr.write_all(&Self::cue(pattern)).and_then(|_| stderr.flush()) {
            debug!("Terminal bell unavailable: {}", e);
        }
    }
}
