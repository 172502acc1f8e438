//! Duck-typed callables for sources, defaults, transforms, and conditions.
//!
//! Declarations accept behavior in two shapes: a routine named on the task
//! instance, or an inline closure. Both collapse into one tagged variant,
//! [`Callable`], dispatched through a single point ([`invoke_callable`]) so
//! the resolver and executor never branch on callable kind themselves.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::context::Context;
use crate::task::Task;

/// What a callable can observe when it runs: the shared context, the
/// attributes resolved so far during this invocation, and (for transforms
/// and per-value conditions) the value currently flowing through the
/// attribute pipeline.
pub struct CallScope<'a> {
    context: &'a Context,
    resolved: &'a IndexMap<String, Value>,
    value: Option<&'a Value>,
}

impl<'a> CallScope<'a> {
    pub(crate) fn new(context: &'a Context, resolved: &'a IndexMap<String, Value>, value: Option<&'a Value>) -> Self {
        Self { context, resolved, value }
    }

    /// The shared execution context.
    pub fn context(&self) -> &Context {
        self.context
    }

    /// An attribute resolved earlier in declaration order, by accessor name
    /// or dotted path.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.resolved.get(&crate::context::normalize_path(name))
    }

    /// The value currently under resolution, when one exists.
    pub fn value(&self) -> Option<&Value> {
        self.value
    }
}

/// A reference to invokable behavior attached to a declaration.
#[derive(Clone)]
pub enum Callable {
    /// A routine named on the task instance, dispatched through
    /// [`Task::invoke_named`].
    Named(String),
    /// An inline function.
    Func(Arc<dyn Fn(&CallScope) -> anyhow::Result<Value> + Send + Sync>),
}

impl Callable {
    /// References a named routine on the task instance.
    pub fn named(name: impl Into<String>) -> Self {
        Callable::Named(name.into())
    }

    /// Wraps an inline function.
    pub fn func(function: impl Fn(&CallScope) -> anyhow::Result<Value> + Send + Sync + 'static) -> Self {
        Callable::Func(Arc::new(function))
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Callable::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Failure modes of callable dispatch.
#[derive(Debug, Error)]
pub enum CallableError {
    /// A named routine does not exist on the task instance. Distinct from a
    /// missing value so declaration typos surface as their own failure.
    #[error("is sourced from undefined routine '{name}'")]
    Undefined { name: String },

    /// The callable ran and returned an error.
    #[error("{0}")]
    Failed(#[from] anyhow::Error),
}

/// The single dispatch point for every callable kind.
///
/// Named routines are looked up on the task instance; `None` means the
/// routine does not exist and yields [`CallableError::Undefined`].
pub fn invoke_callable(callable: &Callable, task: &dyn Task, scope: &CallScope) -> Result<Value, CallableError> {
    match callable {
        Callable::Named(name) => match task.invoke_named(name, scope) {
            Some(outcome) => outcome.map_err(CallableError::Failed),
            None => Err(CallableError::Undefined { name: name.clone() }),
        },
        Callable::Func(function) => function(scope).map_err(CallableError::Failed),
    }
}

/// A boolean condition over a [`CallScope`], used for conditional
/// requirement, per-rule `if`/`unless` options, and workflow guards.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&CallScope) -> bool + Send + Sync>);

impl Predicate {
    /// Wraps a condition closure.
    pub fn new(condition: impl Fn(&CallScope) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(condition))
    }

    /// Evaluates the condition.
    pub fn evaluate(&self, scope: &CallScope) -> bool {
        (self.0)(scope)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}
