//! Cycle controller types

use sdk::{KernelError, LedgerSnapshot, Outcome, Phase};

/// Opaque handle to a submitted objective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectiveHandle {
    id: String,
}

impl ObjectiveHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Result of one `advance` call: exactly one transition happened.
#[derive(Debug)]
pub enum PhaseResult {
    /// ROUTING completed and a handler was assigned.
    Routed { capability: String },

    /// One OODA phase committed (a success, or a failure that will be
    /// retried/replanned on the next `advance`).
    Committed { phase: Phase, outcome: Outcome },

    /// The handler signalled completion; the objective is DONE.
    Done { summary: String },

    /// The objective is BLOCKED.
    Blocked { reason: String },

    /// The objective moved to FAILED. The final snapshot is carried along so
    /// the caller can inspect or manually resume even though the live ledger
    /// record is gone.
    Failed {
        error: KernelError,
        snapshot: Option<LedgerSnapshot>,
    },

    /// A cancellation request was honored at this phase boundary.
    Cancelled,
}

/// The phase the next `advance` will run, given what the snapshot records.
///
/// A failed ACT leaves `last_completed_phase = ACT` with a `replan` hint, so
/// the machine moves to ORIENT instead of opening a fresh cycle; every other
/// hint follows the normal progression. Failed OBSERVE/ORIENT/DECIDE phases
/// leave the snapshot's phase untouched, which naturally re-runs them.
pub fn next_phase(last_completed: Option<Phase>, hint: &str) -> Phase {
    match last_completed {
        None => Phase::Observe,
        Some(Phase::Observe) => Phase::Orient,
        Some(Phase::Orient) => Phase::Decide,
        Some(Phase::Decide) => Phase::Act,
        Some(Phase::Act) => {
            if hint == "replan" {
                Phase::Orient
            } else {
                Phase::Observe
            }
        }
    }
}
