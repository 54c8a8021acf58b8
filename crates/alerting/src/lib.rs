//! Alerting System
//!
//! Turns the analyzer's noisy drowsy/yawning flags into a small number of
//! audibly distinct alerts: rising-edge detection with critical priority,
//! gated by a cooldown window shared across alert kinds.

mod cooldown;
mod debouncer;
mod pattern;
mod renderer;

pub use cooldown::CooldownGate;
pub use debouncer::{AlertDebouncer, DebounceConfig};
pub use pattern::{AlertKind, AlertPattern, Tone, ToneSequence};
pub use renderer::{AlertRenderer, TerminalRenderer};
