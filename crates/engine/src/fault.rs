//! Strict-mode interruptions.
//!
//! Tolerant execution always returns the outcome record; strict execution
//! raises a [`Fault`] when the final status lands in the configured
//! breakpoint set. The fault carries the same record the tolerant path
//! would have returned, so callers lose nothing by catching it.

use std::any::TypeId;

use thiserror::Error;

use operon_types::ExecutionStatus;

use crate::chain::Chain;
use crate::context::Context;
use crate::result::TaskResult;

/// Typed interruption raised by strict-mode execution.
#[derive(Debug, Clone, Error)]
pub enum Fault {
    /// The invocation was intentionally skipped.
    #[error("skipped: {0}")]
    Skipped(TaskResult),

    /// The invocation failed.
    #[error("failed: {0}")]
    Failed(TaskResult),
}

impl Fault {
    /// Builds the fault matching a halted record's status; `None` for
    /// success, which never raises.
    pub(crate) fn from_result(result: &TaskResult) -> Option<Fault> {
        match result.status() {
            ExecutionStatus::Skipped => Some(Fault::Skipped(result.clone())),
            ExecutionStatus::Failed => Some(Fault::Failed(result.clone())),
            ExecutionStatus::Success => None,
        }
    }

    /// The outcome record that triggered this fault.
    pub fn result(&self) -> &TaskResult {
        match self {
            Fault::Skipped(result) | Fault::Failed(result) => result,
        }
    }

    /// Name of the task type the fault originated from.
    pub fn task_name(&self) -> &str {
        self.result().task_name()
    }

    /// The context the triggering invocation ran against.
    pub fn context(&self) -> &Context {
        self.result().context()
    }

    /// The chain the triggering record belongs to.
    pub fn chain(&self) -> &Chain {
        self.result().chain()
    }

    /// True when the triggering record was produced by task type `T`.
    pub fn is_for<T: 'static>(&self) -> bool {
        self.result().task_type() == TypeId::of::<T>()
    }

    /// True when the triggering record satisfies an arbitrary predicate.
    pub fn matches(&self, predicate: impl Fn(&TaskResult) -> bool) -> bool {
        predicate(self.result())
    }
}
