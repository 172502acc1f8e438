//! Type coercion registry.
//!
//! Converters are keyed by symbolic name (`"integer"`, `"boolean"`, ...) and
//! map a raw value into the declared type or report that they cannot. A
//! declaration may list several types as a deliberate fallback chain: the
//! first converter that succeeds wins, and only when every one refuses does
//! the attribute fail with a message naming all attempted types.
//!
//! Built-ins live in a process-wide registry; a task type can overlay its
//! own converters (consulted first) or the caller can register and remove
//! entries globally.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde_json::Value;
use thiserror::Error;

/// A converter could not produce a value of its declared type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CoercionError {
    message: String,
}

impl CoercionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Options forwarded to a converter (currently rule-specific parameters
/// such as a datetime format).
#[derive(Debug, Clone, Default)]
pub struct CoercionOptions {
    pub params: serde_json::Map<String, Value>,
}

/// Converter callable: `(value, options) -> converted | CoercionError`.
pub type Coercer = Arc<dyn Fn(&Value, &CoercionOptions) -> Result<Value, CoercionError> + Send + Sync>;

static GLOBAL: Lazy<RwLock<HashMap<String, Coercer>>> = Lazy::new(|| RwLock::new(built_in_coercers()));

/// Registers a converter process-wide.
pub fn register_global(name: impl Into<String>, coercer: impl Fn(&Value, &CoercionOptions) -> Result<Value, CoercionError> + Send + Sync + 'static) {
    GLOBAL
        .write()
        .expect("coercion registry lock poisoned")
        .insert(name.into(), Arc::new(coercer));
}

/// Removes a single process-wide converter.
pub fn unregister_global(name: &str) {
    GLOBAL.write().expect("coercion registry lock poisoned").remove(name);
}

/// Restores the built-in converter set. Intended for tests.
pub fn reset_global() {
    *GLOBAL.write().expect("coercion registry lock poisoned") = built_in_coercers();
}

/// Per-task overlay of converters, consulted before the global registry.
#[derive(Clone, Default)]
pub struct CoercionRegistry {
    local: HashMap<String, Coercer>,
}

impl CoercionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task-scoped converter, shadowing any global entry of the
    /// same name.
    pub fn register(&mut self, name: impl Into<String>, coercer: impl Fn(&Value, &CoercionOptions) -> Result<Value, CoercionError> + Send + Sync + 'static) {
        self.local.insert(name.into(), Arc::new(coercer));
    }

    /// Removes a task-scoped converter.
    pub fn unregister(&mut self, name: &str) {
        self.local.remove(name);
    }

    /// True when the name resolves locally or globally.
    pub fn knows(&self, name: &str) -> bool {
        self.local.contains_key(name) || GLOBAL.read().expect("coercion registry lock poisoned").contains_key(name)
    }

    fn lookup(&self, name: &str) -> Option<Coercer> {
        self.local
            .get(name)
            .cloned()
            .or_else(|| GLOBAL.read().expect("coercion registry lock poisoned").get(name).cloned())
    }

    /// Tries each declared type in order; the first success wins. The
    /// failure message names every attempted type.
    pub fn coerce_chain(&self, types: &[String], value: &Value, options: &CoercionOptions) -> Result<Value, CoercionError> {
        for type_name in types {
            // Unknown names are rejected at declaration verification.
            if let Some(coercer) = self.lookup(type_name)
                && let Ok(converted) = coercer(value, options)
            {
                return Ok(converted);
            }
        }
        Err(chain_error(types))
    }
}

impl std::fmt::Debug for CoercionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoercionRegistry")
            .field("local", &self.local.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn chain_error(types: &[String]) -> CoercionError {
    match types {
        [single] => CoercionError::new(format!("could not coerce into {}", with_article(single))),
        many => CoercionError::new(format!("could not coerce into one of: {}", many.join(", "))),
    }
}

fn with_article(type_name: &str) -> String {
    match type_name.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => format!("an {}", type_name),
        _ => format!("a {}", type_name),
    }
}

fn built_in_coercers() -> HashMap<String, Coercer> {
    let mut coercers: HashMap<String, Coercer> = HashMap::new();
    coercers.insert("string".into(), Arc::new(coerce_string));
    coercers.insert("integer".into(), Arc::new(coerce_integer));
    coercers.insert("float".into(), Arc::new(coerce_float));
    coercers.insert("boolean".into(), Arc::new(coerce_boolean));
    coercers.insert("array".into(), Arc::new(coerce_array));
    coercers.insert("object".into(), Arc::new(coerce_object));
    coercers.insert("datetime".into(), Arc::new(coerce_datetime));
    coercers
}

fn refuse(type_name: &str) -> CoercionError {
    CoercionError::new(format!("could not coerce into {}", with_article(type_name)))
}

fn coerce_string(value: &Value, _options: &CoercionOptions) -> Result<Value, CoercionError> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(number) => Ok(Value::String(number.to_string())),
        Value::Bool(flag) => Ok(Value::String(flag.to_string())),
        _ => Err(refuse("string")),
    }
}

fn coerce_integer(value: &Value, _options: &CoercionOptions) -> Result<Value, CoercionError> {
    match value {
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Ok(Value::from(integer))
            } else if let Some(float) = number.as_f64()
                && float.fract() == 0.0
            {
                Ok(Value::from(float as i64))
            } else {
                Err(refuse("integer"))
            }
        }
        Value::String(text) => text.trim().parse::<i64>().map(Value::from).map_err(|_| refuse("integer")),
        _ => Err(refuse("integer")),
    }
}

fn coerce_float(value: &Value, _options: &CoercionOptions) -> Result<Value, CoercionError> {
    match value {
        Value::Number(number) => number.as_f64().map(Value::from).ok_or_else(|| refuse("float")),
        Value::String(text) => text.trim().parse::<f64>().map(Value::from).map_err(|_| refuse("float")),
        _ => Err(refuse("float")),
    }
}

fn coerce_boolean(value: &Value, _options: &CoercionOptions) -> Result<Value, CoercionError> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "0" => Ok(Value::Bool(false)),
            _ => Err(refuse("boolean")),
        },
        Value::Number(number) => match number.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(refuse("boolean")),
        },
        _ => Err(refuse("boolean")),
    }
}

fn coerce_array(value: &Value, _options: &CoercionOptions) -> Result<Value, CoercionError> {
    match value {
        Value::Array(_) => Ok(value.clone()),
        _ => Err(refuse("array")),
    }
}

fn coerce_object(value: &Value, _options: &CoercionOptions) -> Result<Value, CoercionError> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ Value::Object(_)) => Ok(parsed),
            _ => Err(refuse("object")),
        },
        _ => Err(refuse("object")),
    }
}

fn coerce_datetime(value: &Value, options: &CoercionOptions) -> Result<Value, CoercionError> {
    let Value::String(text) = value else {
        return Err(refuse("datetime"));
    };
    if let Some(format) = options.params.get("format").and_then(Value::as_str) {
        return chrono::NaiveDateTime::parse_from_str(text, format)
            .map(|parsed| Value::String(parsed.and_utc().to_rfc3339()))
            .map_err(|_| refuse("datetime"));
    }
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|parsed| Value::String(parsed.to_rfc3339()))
        .map_err(|_| refuse("datetime"))
}
