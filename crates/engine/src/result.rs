//! Immutable outcome records.
//!
//! Every invocation finalizes into exactly one [`TaskResult`]: the state and
//! status it ended with, the reason and metadata attached at halt time, the
//! context it ran against, its position in the thread's [`Chain`], and the
//! provenance pointers that reconstruct where a propagated failure
//! originated. Records are cheap to clone (shared inner) and never change
//! after finalization; callers branch on them instead of catching errors for
//! ordinary control flow.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::Value;

use operon_types::{ExecutionState, ExecutionStatus};

use crate::chain::Chain;
use crate::context::Context;

pub(crate) struct ResultDraft {
    pub task_name: String,
    pub task_type: TypeId,
    pub state: ExecutionState,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
    pub metadata: serde_json::Map<String, Value>,
    pub cause: Option<Arc<anyhow::Error>>,
    pub context: Context,
    pub chain: Chain,
    pub index: usize,
    pub started_at: DateTime<Utc>,
    pub runtime: Duration,
    pub caused_failure: Option<TaskResult>,
    pub threw_failure: Option<TaskResult>,
}

impl ResultDraft {
    pub(crate) fn finalize(self) -> TaskResult {
        TaskResult {
            inner: Arc::new(ResultInner {
                task_name: self.task_name,
                task_type: self.task_type,
                state: self.state,
                status: self.status,
                reason: self.reason,
                metadata: self.metadata,
                cause: self.cause,
                context: self.context,
                chain: self.chain,
                index: self.index,
                started_at: self.started_at,
                runtime: self.runtime,
                caused_failure: self.caused_failure,
                threw_failure: self.threw_failure,
            }),
        }
    }
}

struct ResultInner {
    task_name: String,
    task_type: TypeId,
    state: ExecutionState,
    status: ExecutionStatus,
    reason: Option<String>,
    metadata: serde_json::Map<String, Value>,
    cause: Option<Arc<anyhow::Error>>,
    context: Context,
    chain: Chain,
    index: usize,
    started_at: DateTime<Utc>,
    runtime: Duration,
    caused_failure: Option<TaskResult>,
    threw_failure: Option<TaskResult>,
}

/// Finalized record of one task invocation.
#[derive(Clone)]
pub struct TaskResult {
    inner: Arc<ResultInner>,
}

impl TaskResult {
    /// Name of the task type that produced this record.
    pub fn task_name(&self) -> &str {
        &self.inner.task_name
    }

    pub(crate) fn task_type(&self) -> TypeId {
        self.inner.task_type
    }

    /// Lifecycle state the invocation ended in.
    pub fn state(&self) -> ExecutionState {
        self.inner.state
    }

    /// Outcome status the invocation ended with.
    pub fn status(&self) -> ExecutionStatus {
        self.inner.status
    }

    /// `(state, status)` pair for pattern-style branching.
    pub fn state_status(&self) -> (ExecutionState, ExecutionStatus) {
        (self.inner.state, self.inner.status)
    }

    /// Reason attached when the invocation halted, if any.
    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.as_deref()
    }

    /// Open metadata attached at halt time.
    pub fn metadata(&self) -> &serde_json::Map<String, Value> {
        &self.inner.metadata
    }

    /// The structured validation payload, when the record failed with
    /// reason "Invalid".
    pub fn errors(&self) -> Option<&Value> {
        self.inner.metadata.get("errors")
    }

    /// The uncontrolled error captured at the invocation boundary, if one
    /// escaped the work routine.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.inner.cause.as_deref()
    }

    /// The context the invocation ran against.
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// The thread-scoped chain this record belongs to.
    pub fn chain(&self) -> &Chain {
        &self.inner.chain
    }

    /// Position of this record within its chain.
    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Wall-clock time the invocation entered execution.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Time spent between invocation entry and finalization.
    pub fn runtime(&self) -> Duration {
        self.inner.runtime
    }

    pub fn is_success(&self) -> bool {
        self.inner.status == ExecutionStatus::Success
    }

    pub fn is_skipped(&self) -> bool {
        self.inner.status == ExecutionStatus::Skipped
    }

    pub fn is_failed(&self) -> bool {
        self.inner.status == ExecutionStatus::Failed
    }

    pub fn is_complete(&self) -> bool {
        self.inner.state == ExecutionState::Complete
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.state == ExecutionState::Interrupted
    }

    /// True once the invocation reached a terminal state.
    pub fn is_executed(&self) -> bool {
        self.inner.state.is_finalized()
    }

    /// Success or intentional skip.
    pub fn is_good(&self) -> bool {
        !self.is_failed()
    }

    /// Skipped or failed.
    pub fn is_bad(&self) -> bool {
        self.inner.status.is_halted()
    }

    /// The record that originated a propagated failure, forwarded
    /// transitively through every `throw`.
    pub fn caused_failure(&self) -> Option<&TaskResult> {
        self.inner.caused_failure.as_ref()
    }

    /// The record whose outcome was thrown directly into this invocation.
    pub fn threw_failure(&self) -> Option<&TaskResult> {
        self.inner.threw_failure.as_ref()
    }

    /// True when this invocation originated the failure itself: it failed
    /// and carries no provenance pointers.
    pub fn is_caused_failure(&self) -> bool {
        self.is_failed() && self.inner.caused_failure.is_none() && self.inner.threw_failure.is_none()
    }

    /// True when this invocation forwarded another invocation's failure.
    pub fn is_threw_failure(&self) -> bool {
        self.is_failed() && self.inner.threw_failure.is_some()
    }

    /// True when this invocation received a forwarded failure.
    pub fn is_thrown_failure(&self) -> bool {
        self.is_failed() && self.inner.caused_failure.is_some()
    }

    /// Evaluates a state/status/compound predicate by name.
    ///
    /// Recognized names: `success`, `skipped`, `failed`, `initialized`,
    /// `executing`, `complete`, `interrupted`, `executed`, `good`, `bad`,
    /// `caused_failure`, `threw_failure`, `thrown_failure`.
    pub fn satisfies(&self, predicate: &str) -> bool {
        match predicate {
            "success" => self.is_success(),
            "skipped" => self.is_skipped(),
            "failed" => self.is_failed(),
            "initialized" => self.inner.state == ExecutionState::Initialized,
            "executing" => self.inner.state == ExecutionState::Executing,
            "complete" => self.is_complete(),
            "interrupted" => self.is_interrupted(),
            "executed" => self.is_executed(),
            "good" => self.is_good(),
            "bad" => self.is_bad(),
            "caused_failure" => self.is_caused_failure(),
            "threw_failure" => self.is_threw_failure(),
            "thrown_failure" => self.is_thrown_failure(),
            other => {
                tracing::warn!(predicate = other, "unknown result predicate");
                false
            }
        }
    }

    /// Runs the hook when the named predicate holds; returns the record for
    /// chaining.
    pub fn on(&self, predicate: &str, hook: impl FnOnce(&TaskResult)) -> &Self {
        if self.satisfies(predicate) {
            hook(self);
        }
        self
    }

    /// Runs the hook when the record succeeded.
    pub fn on_success(&self, hook: impl FnOnce(&TaskResult)) -> &Self {
        self.on("success", hook)
    }

    /// Runs the hook when the record was skipped.
    pub fn on_skipped(&self, hook: impl FnOnce(&TaskResult)) -> &Self {
        self.on("skipped", hook)
    }

    /// Runs the hook when the record failed.
    pub fn on_failed(&self, hook: impl FnOnce(&TaskResult)) -> &Self {
        self.on("failed", hook)
    }

    /// Runs the hook when the routine returned normally.
    pub fn on_complete(&self, hook: impl FnOnce(&TaskResult)) -> &Self {
        self.on("complete", hook)
    }

    /// Runs the hook when the invocation was halted.
    pub fn on_interrupted(&self, hook: impl FnOnce(&TaskResult)) -> &Self {
        self.on("interrupted", hook)
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.inner.task_name, self.inner.state, self.inner.status)?;
        if let Some(reason) = self.reason() {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskResult")
            .field("task", &self.inner.task_name)
            .field("state", &self.inner.state)
            .field("status", &self.inner.status)
            .field("reason", &self.inner.reason)
            .field("index", &self.inner.index)
            .finish_non_exhaustive()
    }
}

impl Serialize for TaskResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("task", &self.inner.task_name)?;
        map.serialize_entry("state", &self.inner.state)?;
        map.serialize_entry("status", &self.inner.status)?;
        map.serialize_entry("reason", &self.inner.reason)?;
        map.serialize_entry("metadata", &self.inner.metadata)?;
        map.serialize_entry("index", &self.inner.index)?;
        map.serialize_entry("chain_id", &self.inner.chain.id())?;
        map.serialize_entry("started_at", &self.inner.started_at.to_rfc3339())?;
        map.serialize_entry("runtime_ms", &(self.inner.runtime.as_millis() as u64))?;
        map.end()
    }
}
