//! Per-symbol update state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Where a symbol is in its update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymbolPhase {
    #[default]
    Idle,
    Fetching,
    Computing,
    Persisting,
    /// Waiting before the next fetch attempt
    Backoff,
    /// Terminal; the scheduler stopped after repeated failed cycles
    Halted,
}

impl fmt::Display for SymbolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SymbolPhase::Idle => "idle",
            SymbolPhase::Fetching => "fetching",
            SymbolPhase::Computing => "computing",
            SymbolPhase::Persisting => "persisting",
            SymbolPhase::Backoff => "backoff",
            SymbolPhase::Halted => "halted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct UpdateState {
    pub phase: SymbolPhase,
    pub last_success: Option<DateTime<Utc>>,
    /// Failed fetch attempts since the last success
    pub consecutive_errors: u32,
    pub backoff_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl UpdateState {
    pub(crate) fn enter(&mut self, phase: SymbolPhase) {
        if self.phase != SymbolPhase::Halted {
            self.phase = phase;
        }
    }

    pub(crate) fn record_failure(&mut self, error: String, backoff_until: Option<DateTime<Utc>>) {
        self.consecutive_errors += 1;
        self.last_error = Some(error);
        self.backoff_until = backoff_until;
        self.enter(if backoff_until.is_some() {
            SymbolPhase::Backoff
        } else {
            SymbolPhase::Idle
        });
    }

    pub(crate) fn record_success(&mut self, at: DateTime<Utc>) {
        self.consecutive_errors = 0;
        self.last_error = None;
        self.backoff_until = None;
        self.last_success = Some(at);
        self.enter(SymbolPhase::Idle);
    }
}
