//! Shared execution context.
//!
//! The context is the value store threaded through one invocation and every
//! task it delegates to. It is reference-passed: cloning a [`Context`] yields
//! a handle onto the same storage, so a write made by a workflow member is
//! visible to the members that run after it. Keys are normalized with a
//! case-insensitive snake_case fold, so `"userName"`, `"UserName"`, and
//! `"user_name"` address the same entry.

use std::sync::{Arc, Mutex};

use heck::ToSnakeCase;
use indexmap::IndexMap;
use serde_json::Value;

/// Folds a key to its canonical form.
pub(crate) fn normalize_key(key: &str) -> String {
    key.to_snake_case()
}

/// Folds a dotted path segment-wise, preserving the dots that separate
/// nested attribute accessors.
pub(crate) fn normalize_path(path: &str) -> String {
    path.split('.').map(normalize_key).collect::<Vec<_>>().join(".")
}

/// Mutable key/value store shared by reference across an invocation.
///
/// Values are arbitrary JSON. Entry order is preserved for deterministic
/// snapshots and logs.
#[derive(Debug, Clone, Default)]
pub struct Context {
    entries: Arc<Mutex<IndexMap<String, Value>>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a value by normalized key, cloning it out of the shared store.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().expect("context lock poisoned").get(&normalize_key(key)).cloned()
    }

    /// Writes a value under a normalized key.
    pub fn insert(&self, key: impl AsRef<str>, value: Value) {
        self.entries
            .lock()
            .expect("context lock poisoned")
            .insert(normalize_key(key.as_ref()), value);
    }

    /// Removes and returns a value by normalized key.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .expect("context lock poisoned")
            .shift_remove(&normalize_key(key))
    }

    /// True when the normalized key holds a value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().expect("context lock poisoned").contains_key(&normalize_key(key))
    }

    /// Merges every entry of a JSON object map into the store.
    pub fn merge(&self, values: serde_json::Map<String, Value>) {
        let mut entries = self.entries.lock().expect("context lock poisoned");
        for (key, value) in values {
            entries.insert(normalize_key(&key), value);
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("context lock poisoned").len()
    }

    /// True when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the current entries into a plain JSON object map.
    ///
    /// The snapshot is detached from the shared storage; later writes do not
    /// affect it. Intended for logging and assertions.
    pub fn snapshot(&self) -> serde_json::Map<String, Value> {
        self.entries
            .lock()
            .expect("context lock poisoned")
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// True when two handles share the same underlying storage.
    pub fn shares_storage_with(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl From<serde_json::Map<String, Value>> for Context {
    fn from(values: serde_json::Map<String, Value>) -> Self {
        let context = Context::new();
        context.merge(values);
        context
    }
}

/// Input accepted by the invocation API: either caller-supplied key/value
/// data (a fresh context is built) or an existing [`Context`] handle (reused
/// verbatim, never copied).
#[derive(Debug, Clone)]
pub enum ContextInput {
    /// Plain key/value data; a new context is created from it.
    Map(serde_json::Map<String, Value>),
    /// An existing context, shared by reference.
    Existing(Context),
}

impl ContextInput {
    /// Produces the context the invocation will run against.
    pub fn into_context(self) -> Context {
        match self {
            ContextInput::Map(values) => Context::from(values),
            ContextInput::Existing(context) => context,
        }
    }
}

impl From<Context> for ContextInput {
    fn from(context: Context) -> Self {
        ContextInput::Existing(context)
    }
}

impl From<serde_json::Map<String, Value>> for ContextInput {
    fn from(values: serde_json::Map<String, Value>) -> Self {
        ContextInput::Map(values)
    }
}

impl From<Value> for ContextInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(values) => ContextInput::Map(values),
            _ => ContextInput::Map(serde_json::Map::new()),
        }
    }
}
