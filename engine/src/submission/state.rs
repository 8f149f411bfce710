//! Per-run lifecycle: `Built -> Signed -> {Simulated | Submitted} -> Classified`.
//!
//! Every run ends in a terminal state, success or not. Transitions out of
//! order are refused and leave the state untouched; there is no way back
//! from a terminal state.

use serde::Serialize;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use crate::outcome::ResultClass;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Pipeline stage, used in progress events, logs and abort metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Preflight,
    Resolve,
    Build,
    Affordability,
    Sign,
    Simulate,
    Submit,
    Classify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Preflight => "preflight",
            Self::Resolve => "resolve",
            Self::Build => "build",
            Self::Affordability => "affordability",
            Self::Sign => "sign",
            Self::Simulate => "simulate",
            Self::Submit => "submit",
            Self::Classify => "classify",
        }
    }

    /// Default progress text for the stage.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Fetch => "fetching account state",
            Self::Preflight => "validating operation",
            Self::Resolve => "resolving signing authority",
            Self::Build => "computing fee",
            Self::Affordability => "checking reserve",
            Self::Sign => "signing",
            Self::Simulate => "simulating",
            Self::Submit => "awaiting validation",
            Self::Classify => "classifying result",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Built,
    Signed,
    Simulated,
    Submitted,
    /// Terminal: the raw response was classified.
    Classified { class: ResultClass },
    /// Terminal: the run stopped at `stage` without a ledger verdict.
    Aborted { stage: Stage },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Classified { .. } | Self::Aborted { .. })
    }
}

/// Tracks one run from a built operation to its terminal state.
#[derive(Debug)]
pub struct RunStateMachine {
    run_id: Uuid,
    state: RunState,
    started_at: Instant,
}

impl RunStateMachine {
    /// Start tracking a run whose operation has just been built.
    pub fn built(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::Built,
            started_at: Instant::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn mark_signed(&mut self) -> bool {
        self.advance(RunState::Built, RunState::Signed)
    }

    pub fn mark_simulated(&mut self) -> bool {
        self.advance(RunState::Signed, RunState::Simulated)
    }

    pub fn mark_submitted(&mut self) -> bool {
        self.advance(RunState::Signed, RunState::Submitted)
    }

    pub fn mark_classified(&mut self, class: ResultClass) -> bool {
        match self.state {
            RunState::Simulated | RunState::Submitted => {
                self.state = RunState::Classified { class };
                true
            }
            _ => false,
        }
    }

    /// Stop the run. No effect once terminal.
    pub fn abort(&mut self, stage: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = RunState::Aborted { stage };
        true
    }

    fn advance(&mut self, from: RunState, to: RunState) -> bool {
        if self.state == from {
            self.state = to;
            true
        } else {
            false
        }
    }
}
