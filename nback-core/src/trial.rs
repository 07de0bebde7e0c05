use crate::condition::Condition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the participant indicated on a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Response {
    Target,
    NonTarget,
    NoResponse,
}

/// A valid button press observed by a response device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub code: char,
    /// Time from the start of the wait that observed the press.
    pub latency: Duration,
}

/// One scored trial, as written to the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub block: usize,
    pub condition: Condition,
    pub trial: usize,
    /// Not part of the default log layout, but kept for replay.
    pub letter: Option<char>,
    pub button: Option<char>,
    /// Milliseconds from stimulus onset.
    pub reaction_time_ms: Option<u64>,
    pub correct: bool,
    /// Seconds since session zero.
    pub block_start_s: f64,
    pub trial_start_s: f64,
}

impl TrialRecord {
    pub fn responded(&self) -> bool {
        self.button.is_some()
    }
}
