//! The task trait and the halt primitives available inside a work routine.
//!
//! A task declares its inputs ([`Task::attributes`]), its expected outputs
//! ([`Task::outputs`]), and a work routine ([`Task::call`]). The routine
//! receives a [`Run`] handle for the resolved attributes and shared context,
//! and ends in one of two ways: a normal `Ok(())` return, or an early return
//! carrying a [`Halt`] — the only sanctioned way to end a routine with a
//! controlled outcome. Any other error is converted into [`Halt::Error`] by
//! `?` and captured at the invocation boundary as a failed outcome, never
//! left to propagate in tolerant mode.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use operon_types::ExecutionStatus;

use crate::attribute::{AttributeSpec, CoercionRegistry, ValidatorRegistry};
use crate::callable::CallScope;
use crate::context::{Context, normalize_path};
use crate::result::TaskResult;
use crate::settings::{Settings, SettingsPatch};

/// Placeholder reason recorded when a halt omits one.
pub const UNSPECIFIED_REASON: &str = "no reason given";

/// How a work routine ends: normal return or a controlled halt.
pub type Control = Result<(), Halt>;

/// A declared unit of business logic.
pub trait Task {
    /// Input declarations, resolved in order before the routine runs.
    fn attributes(&self) -> Vec<AttributeSpec> {
        Vec::new()
    }

    /// Context keys that must be present after a successful run.
    fn outputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Per-task configuration overrides, merged over the process defaults
    /// once at invocation entry.
    fn settings(&self) -> SettingsPatch {
        SettingsPatch::default()
    }

    /// Task-scoped type converters, consulted before the global registry.
    fn coercions(&self) -> CoercionRegistry {
        CoercionRegistry::default()
    }

    /// Task-scoped validation rules, consulted before the global registry.
    fn validators(&self) -> ValidatorRegistry {
        ValidatorRegistry::default()
    }

    /// Dispatch surface for routines referenced by name in declarations
    /// (sources, defaults, transforms). Returning `None` means the routine
    /// does not exist, which surfaces as an "undefined routine" failure.
    fn invoke_named(&self, name: &str, scope: &CallScope) -> Option<anyhow::Result<Value>> {
        let _ = (name, scope);
        None
    }

    /// The work routine.
    fn call(&mut self, run: &mut Run) -> Control;
}

/// Intentional interruption of a work routine.
#[derive(Debug)]
pub enum Halt {
    /// Skip the rest of the work; the outcome becomes `skipped`.
    Skip {
        reason: Option<String>,
        metadata: serde_json::Map<String, Value>,
    },
    /// Fail the work; the outcome becomes `failed`.
    Fail {
        reason: Option<String>,
        metadata: serde_json::Map<String, Value>,
        cause: Option<Arc<anyhow::Error>>,
    },
    /// Re-raise another invocation's outcome, preserving provenance.
    Throw {
        outcome: TaskResult,
        metadata: serde_json::Map<String, Value>,
    },
    /// An uncontrolled error that escaped the routine via `?`.
    Error(anyhow::Error),
}

impl Halt {
    /// Skips with a reason.
    pub fn skip(reason: impl Into<String>) -> Self {
        Halt::Skip {
            reason: Some(reason.into()),
            metadata: serde_json::Map::new(),
        }
    }

    /// Skips without a reason; the outcome records [`UNSPECIFIED_REASON`].
    pub fn skip_unexplained() -> Self {
        Halt::Skip {
            reason: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Fails with a reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        Halt::Fail {
            reason: Some(reason.into()),
            metadata: serde_json::Map::new(),
            cause: None,
        }
    }

    /// Fails without a reason; the outcome records [`UNSPECIFIED_REASON`].
    pub fn fail_unexplained() -> Self {
        Halt::Fail {
            reason: None,
            metadata: serde_json::Map::new(),
            cause: None,
        }
    }

    /// Fails with a reason and an underlying error retained as the cause.
    pub fn fail_from(reason: impl Into<String>, cause: anyhow::Error) -> Self {
        Halt::Fail {
            reason: Some(reason.into()),
            metadata: serde_json::Map::new(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Re-raises another invocation's outcome.
    pub fn throw(outcome: &TaskResult) -> Self {
        Halt::Throw {
            outcome: outcome.clone(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attaches one metadata entry to the halt.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        match &mut self {
            Halt::Skip { metadata, .. } | Halt::Fail { metadata, .. } | Halt::Throw { metadata, .. } => {
                metadata.insert(key.into(), value);
            }
            Halt::Error(_) => {}
        }
        self
    }
}

impl From<anyhow::Error> for Halt {
    fn from(error: anyhow::Error) -> Self {
        Halt::Error(error)
    }
}

/// A status recorded by a non-halting skip/fail while the routine keeps
/// running.
#[derive(Debug, Clone)]
pub(crate) struct PendingMark {
    pub status: ExecutionStatus,
    pub reason: Option<String>,
    pub metadata: serde_json::Map<String, Value>,
}

/// Per-invocation handle passed to the work routine.
///
/// Exposes the resolved attributes (memoized for the whole invocation), the
/// shared context, the effective settings, and the non-halting skip/fail
/// variants.
pub struct Run {
    context: Context,
    resolved: indexmap::IndexMap<String, Value>,
    settings: Settings,
    pending: Option<PendingMark>,
}

impl Run {
    pub(crate) fn new(context: Context, resolved: indexmap::IndexMap<String, Value>, settings: Settings) -> Self {
        Self {
            context,
            resolved,
            settings,
            pending: None,
        }
    }

    /// The shared execution context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// A resolved attribute by accessor name or dotted path. The same name
    /// always returns the identical resolved value within one invocation.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.resolved.get(&normalize_path(name))
    }

    /// A resolved attribute deserialized into a concrete type.
    pub fn attribute_as<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .attribute(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("attribute '{}' was not resolved", name))?;
        serde_json::from_value(value).map_err(|error| anyhow::anyhow!("attribute '{}': {}", name, error))
    }

    /// True when the attribute resolved to a value.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.resolved.contains_key(&normalize_path(name))
    }

    /// The effective settings for this invocation.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Records a skipped status without halting the routine. The explicit
    /// opt-out of halting; the status track stays one-directional.
    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.mark(ExecutionStatus::Skipped, Some(reason.into()), serde_json::Map::new());
    }

    /// Records a skipped status with one metadata entry attached to the
    /// eventual record.
    pub fn mark_skipped_with(&mut self, reason: impl Into<String>, key: impl Into<String>, value: Value) {
        self.mark(ExecutionStatus::Skipped, Some(reason.into()), single_entry(key, value));
    }

    /// Records a failed status without halting the routine.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.mark(ExecutionStatus::Failed, Some(reason.into()), serde_json::Map::new());
    }

    /// Records a failed status with one metadata entry attached to the
    /// eventual record.
    pub fn mark_failed_with(&mut self, reason: impl Into<String>, key: impl Into<String>, value: Value) {
        self.mark(ExecutionStatus::Failed, Some(reason.into()), single_entry(key, value));
    }

    fn mark(&mut self, status: ExecutionStatus, reason: Option<String>, metadata: serde_json::Map<String, Value>) {
        let current = self.pending.as_ref().map(|mark| mark.status).unwrap_or_default();
        if !current.can_transition_to(status) {
            return;
        }
        self.pending = Some(PendingMark { status, reason, metadata });
    }

    pub(crate) fn take_pending(&mut self) -> Option<PendingMark> {
        self.pending.take()
    }
}

fn single_entry(key: impl Into<String>, value: Value) -> serde_json::Map<String, Value> {
    let mut metadata = serde_json::Map::new();
    metadata.insert(key.into(), value);
    metadata
}
