//! Validation rule registry and built-in rules.
//!
//! Rules are keyed by symbolic name and check an already-coerced value
//! against a business constraint. Every declared rule runs — failures
//! accumulate per attribute instead of short-circuiting — and each rule
//! honors an `allow_nil` skip plus per-rule `if`/`unless` predicates.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::callable::Predicate;

use super::ValidationSpec;

/// A value failed a business rule.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RuleError {
    message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Options attached to one rule reference on a declaration.
#[derive(Debug, Clone, Default)]
pub struct RuleOptions {
    /// Skip the rule entirely when the value is null.
    pub allow_nil: bool,
    /// Run the rule only when this predicate holds.
    pub only_if: Option<Predicate>,
    /// Skip the rule when this predicate holds.
    pub unless: Option<Predicate>,
    /// Rule-specific parameters (pattern, bounds, allowed values, ...).
    pub params: serde_json::Map<String, Value>,
}

impl RuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_nil(mut self) -> Self {
        self.allow_nil = true;
        self
    }

    pub fn only_if(mut self, predicate: Predicate) -> Self {
        self.only_if = Some(predicate);
        self
    }

    pub fn unless(mut self, predicate: Predicate) -> Self {
        self.unless = Some(predicate);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Rule callable: `(value, options) -> () | RuleError`.
pub type Rule = Arc<dyn Fn(&Value, &RuleOptions) -> Result<(), RuleError> + Send + Sync>;

static GLOBAL: Lazy<RwLock<HashMap<String, Rule>>> = Lazy::new(|| RwLock::new(built_in_rules()));

/// Registers a rule process-wide.
pub fn register_global(name: impl Into<String>, rule: impl Fn(&Value, &RuleOptions) -> Result<(), RuleError> + Send + Sync + 'static) {
    GLOBAL.write().expect("validator registry lock poisoned").insert(name.into(), Arc::new(rule));
}

/// Removes a single process-wide rule.
pub fn unregister_global(name: &str) {
    GLOBAL.write().expect("validator registry lock poisoned").remove(name);
}

/// Restores the built-in rule set. Intended for tests.
pub fn reset_global() {
    *GLOBAL.write().expect("validator registry lock poisoned") = built_in_rules();
}

/// Per-task overlay of rules, consulted before the global registry.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    local: HashMap<String, Rule>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task-scoped rule, shadowing any global entry of the same
    /// name.
    pub fn register(&mut self, name: impl Into<String>, rule: impl Fn(&Value, &RuleOptions) -> Result<(), RuleError> + Send + Sync + 'static) {
        self.local.insert(name.into(), Arc::new(rule));
    }

    /// Removes a task-scoped rule.
    pub fn unregister(&mut self, name: &str) {
        self.local.remove(name);
    }

    /// True when the name resolves locally or globally.
    pub fn knows(&self, name: &str) -> bool {
        self.local.contains_key(name) || GLOBAL.read().expect("validator registry lock poisoned").contains_key(name)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Rule> {
        self.local
            .get(name)
            .cloned()
            .or_else(|| GLOBAL.read().expect("validator registry lock poisoned").get(name).cloned())
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("local", &self.local.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Declares a presence rule: the value must be non-null and non-empty.
pub fn presence() -> ValidationSpec {
    ValidationSpec::new("presence", RuleOptions::new())
}

/// Declares a format rule checking text against a regular expression.
pub fn format(pattern: impl Into<String>) -> ValidationSpec {
    ValidationSpec::new("format", RuleOptions::new().param("pattern", Value::String(pattern.into())))
}

/// Declares an inclusion rule: the value must be one of the given set.
pub fn inclusion(values: impl IntoIterator<Item = Value>) -> ValidationSpec {
    ValidationSpec::new("inclusion", RuleOptions::new().param("within", Value::Array(values.into_iter().collect())))
}

/// Declares an exclusion rule: the value must not be one of the given set.
pub fn exclusion(values: impl IntoIterator<Item = Value>) -> ValidationSpec {
    ValidationSpec::new("exclusion", RuleOptions::new().param("within", Value::Array(values.into_iter().collect())))
}

/// Declares a numeric range rule.
pub fn numeric(min: Option<f64>, max: Option<f64>) -> ValidationSpec {
    let mut options = RuleOptions::new();
    if let Some(min) = min {
        options = options.param("min", Value::from(min));
    }
    if let Some(max) = max {
        options = options.param("max", Value::from(max));
    }
    ValidationSpec::new("numeric", options)
}

/// Declares a length rule over text characters or array items.
pub fn length(min: Option<usize>, max: Option<usize>) -> ValidationSpec {
    let mut options = RuleOptions::new();
    if let Some(min) = min {
        options = options.param("min", Value::from(min));
    }
    if let Some(max) = max {
        options = options.param("max", Value::from(max));
    }
    ValidationSpec::new("length", options)
}

fn built_in_rules() -> HashMap<String, Rule> {
    let mut rules: HashMap<String, Rule> = HashMap::new();
    rules.insert("presence".into(), Arc::new(rule_presence));
    rules.insert("format".into(), Arc::new(rule_format));
    rules.insert("inclusion".into(), Arc::new(rule_inclusion));
    rules.insert("exclusion".into(), Arc::new(rule_exclusion));
    rules.insert("numeric".into(), Arc::new(rule_numeric));
    rules.insert("length".into(), Arc::new(rule_length));
    rules
}

fn rule_presence(value: &Value, _options: &RuleOptions) -> Result<(), RuleError> {
    let blank = match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
        _ => false,
    };
    if blank { Err(RuleError::new("cannot be empty")) } else { Ok(()) }
}

fn rule_format(value: &Value, options: &RuleOptions) -> Result<(), RuleError> {
    let Some(pattern) = options.params.get("pattern").and_then(Value::as_str) else {
        return Err(RuleError::new("format rule is missing its pattern"));
    };
    let Value::String(text) = value else {
        return Err(RuleError::new("must be text to match the expected format"));
    };
    let regex = Regex::new(pattern).map_err(|error| RuleError::new(format!("has an invalid pattern '{}': {}", pattern, error)))?;
    if regex.is_match(text) {
        Ok(())
    } else {
        Err(RuleError::new("does not match the expected format"))
    }
}

fn rule_inclusion(value: &Value, options: &RuleOptions) -> Result<(), RuleError> {
    let allowed = options.params.get("within").and_then(Value::as_array);
    match allowed {
        Some(values) if values.contains(value) => Ok(()),
        _ => Err(RuleError::new("is not included in the list")),
    }
}

fn rule_exclusion(value: &Value, options: &RuleOptions) -> Result<(), RuleError> {
    let reserved = options.params.get("within").and_then(Value::as_array);
    match reserved {
        Some(values) if values.contains(value) => Err(RuleError::new("is reserved")),
        _ => Ok(()),
    }
}

fn rule_numeric(value: &Value, options: &RuleOptions) -> Result<(), RuleError> {
    let Some(number) = value.as_f64() else {
        return Err(RuleError::new("must be a number"));
    };
    if let Some(min) = options.params.get("min").and_then(Value::as_f64)
        && number < min
    {
        return Err(RuleError::new(format!("must be greater than or equal to {}", min)));
    }
    if let Some(max) = options.params.get("max").and_then(Value::as_f64)
        && number > max
    {
        return Err(RuleError::new(format!("must be less than or equal to {}", max)));
    }
    Ok(())
}

fn rule_length(value: &Value, options: &RuleOptions) -> Result<(), RuleError> {
    let measured = match value {
        Value::String(text) => text.chars().count(),
        Value::Array(items) => items.len(),
        _ => return Err(RuleError::new("must be text or a list to measure length")),
    };
    if let Some(min) = options.params.get("min").and_then(Value::as_u64)
        && (measured as u64) < min
    {
        return Err(RuleError::new(format!("length must be at least {}", min)));
    }
    if let Some(max) = options.params.get("max").and_then(Value::as_u64)
        && (measured as u64) > max
    {
        return Err(RuleError::new(format!("length must be at most {}", max)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(registry: &ValidatorRegistry, spec: &ValidationSpec, value: &Value) -> Result<(), RuleError> {
        registry.lookup(&spec.rule).expect("rule exists")(value, &spec.options)
    }

    #[test]
    fn presence_rejects_blank_shapes() {
        let registry = ValidatorRegistry::default();
        let spec = presence();

        assert!(run(&registry, &spec, &json!("value")).is_ok());
        assert!(run(&registry, &spec, &json!("  ")).is_err());
        assert!(run(&registry, &spec, &json!([])).is_err());
        assert!(run(&registry, &spec, &json!(null)).is_err());
        assert!(run(&registry, &spec, &json!(0)).is_ok());
    }

    #[test]
    fn format_matches_text_against_its_pattern() {
        let registry = ValidatorRegistry::default();
        let spec = format("^[a-z]{3,5}$");

        assert!(run(&registry, &spec, &json!("abcd")).is_ok());
        assert_eq!(
            run(&registry, &spec, &json!("ABCD")).unwrap_err().message(),
            "does not match the expected format"
        );
        assert!(run(&registry, &spec, &json!(12)).is_err());
    }

    #[test]
    fn inclusion_and_exclusion_share_the_within_parameter() {
        let registry = ValidatorRegistry::default();

        let included = inclusion([json!("a"), json!("b")]);
        assert!(run(&registry, &included, &json!("a")).is_ok());
        assert_eq!(run(&registry, &included, &json!("c")).unwrap_err().message(), "is not included in the list");

        let excluded = exclusion([json!("root")]);
        assert_eq!(run(&registry, &excluded, &json!("root")).unwrap_err().message(), "is reserved");
        assert!(run(&registry, &excluded, &json!("user")).is_ok());
    }

    #[test]
    fn numeric_enforces_bounds() {
        let registry = ValidatorRegistry::default();
        let spec = numeric(Some(18.0), Some(99.0));

        assert!(run(&registry, &spec, &json!(30)).is_ok());
        assert_eq!(
            run(&registry, &spec, &json!(12)).unwrap_err().message(),
            "must be greater than or equal to 18"
        );
        assert_eq!(
            run(&registry, &spec, &json!(120)).unwrap_err().message(),
            "must be less than or equal to 99"
        );
    }

    #[test]
    fn length_measures_characters_and_items() {
        let registry = ValidatorRegistry::default();
        let spec = length(Some(2), Some(3));

        assert!(run(&registry, &spec, &json!("ab")).is_ok());
        assert!(run(&registry, &spec, &json!("a")).is_err());
        assert!(run(&registry, &spec, &json!([1, 2, 3, 4])).is_err());
    }

    #[test]
    fn task_overlay_shadows_the_global_registry() {
        let mut registry = ValidatorRegistry::new();
        registry.register("presence", |_value, _options| Err(RuleError::new("always refused")));

        let spec = presence();
        assert_eq!(run(&registry, &spec, &json!("value")).unwrap_err().message(), "always refused");

        registry.unregister("presence");
        assert!(run(&registry, &spec, &json!("value")).is_ok());
    }
}
