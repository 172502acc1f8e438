//! Execution lifecycle state and outcome status.
//!
//! A task invocation moves through a small state machine
//! (`initialized → executing → complete | interrupted`) while its outcome
//! status moves independently along a one-directional track
//! (`success → skipped | failed`). The two axes are orthogonal: a task can
//! finish in state `complete` with status `failed` when a non-halting
//! failure was recorded during the run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single task invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Constructed but not yet invoked.
    #[default]
    Initialized,
    /// Invocation entered; attributes are resolving or the work routine runs.
    Executing,
    /// The work routine returned normally.
    Complete,
    /// The invocation was halted by a skip, a failure, or an uncaught error.
    Interrupted,
}

impl ExecutionState {
    /// True once the invocation reached a terminal state.
    pub fn is_finalized(&self) -> bool {
        matches!(self, ExecutionState::Complete | ExecutionState::Interrupted)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Initialized => write!(f, "initialized"),
            ExecutionState::Executing => write!(f, "executing"),
            ExecutionState::Complete => write!(f, "complete"),
            ExecutionState::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Outcome status of a task invocation.
///
/// Transitions are monotonic: `Success` may become `Skipped` or `Failed`,
/// but a halted status never reverts to `Success` and never crosses to the
/// other halted status. [`ExecutionStatus::can_transition_to`] encodes that
/// rule for the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The invocation has not been halted.
    #[default]
    Success,
    /// The invocation was intentionally skipped.
    Skipped,
    /// The invocation failed, intentionally or through an uncaught error.
    Failed,
}

impl ExecutionStatus {
    /// True for `Skipped` and `Failed`.
    pub fn is_halted(&self) -> bool {
        matches!(self, ExecutionStatus::Skipped | ExecutionStatus::Failed)
    }

    /// Whether the one-directional status track permits this transition.
    ///
    /// Re-asserting the current status is always permitted; only the
    /// `Success → Skipped` and `Success → Failed` edges move anywhere.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        *self == next || *self == ExecutionStatus::Success
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Skipped => write!(f, "skipped"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}
