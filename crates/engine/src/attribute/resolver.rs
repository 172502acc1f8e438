//! Attribute resolution pipeline.
//!
//! For each declaration, in declaration order: source lookup → requirement
//! check → default → type coercion (fallback chain) → transform →
//! validation → nested children → binding. Every failure across every
//! attribute, nested ones included, is collected into one
//! [`ValidationErrors`] aggregate; resolution never raises per attribute,
//! so a caller sees all invalid fields in one response.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use operon_types::ValidationErrors;

use crate::callable::{CallScope, Callable, invoke_callable};
use crate::context::{Context, normalize_key};
use crate::task::Task;

use super::{AttributeSpec, CoercionOptions, CoercionRegistry, DefaultValue, Source, ValidatorRegistry};

/// Resolved accessor values plus the failure aggregate for one level.
pub(crate) struct ResolutionOutput {
    pub values: IndexMap<String, Value>,
    pub errors: ValidationErrors,
}

/// Where raw values are looked up: the shared context at the top level, or
/// a parent attribute's resolved object for nested declarations.
enum Store<'a> {
    Context(&'a Context),
    Node(&'a serde_json::Map<String, Value>),
}

impl Store<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        match self {
            Store::Context(context) => context.get(name),
            Store::Node(entries) => {
                let wanted = normalize_key(name);
                entries
                    .iter()
                    .find(|(key, _)| normalize_key(key) == wanted)
                    .map(|(_, value)| value.clone())
            }
        }
    }
}

/// Resolves every declaration against the shared context.
pub(crate) fn resolve_all(
    specs: &[AttributeSpec],
    context: &Context,
    task: &dyn Task,
    coercions: &CoercionRegistry,
    validators: &ValidatorRegistry,
) -> ResolutionOutput {
    resolve_level(specs, &Store::Context(context), context, task, coercions, validators)
}

fn resolve_level(
    specs: &[AttributeSpec],
    store: &Store<'_>,
    context: &Context,
    task: &dyn Task,
    coercions: &CoercionRegistry,
    validators: &ValidatorRegistry,
) -> ResolutionOutput {
    let mut values: IndexMap<String, Value> = IndexMap::new();
    let mut errors = ValidationErrors::new();

    for spec in specs {
        let accessor = spec.accessor_name();

        let raw = match lookup_source(spec, specs, store, &values, context, task) {
            Ok(raw) => raw,
            Err(message) => {
                errors.add(&accessor, message);
                continue;
            }
        };
        let mut value = raw.filter(|candidate| !candidate.is_null());

        let required = {
            let scope = CallScope::new(context, &values, None);
            spec.requirement().evaluate(&scope)
        };
        if value.is_none() {
            if required {
                errors.add(&accessor, "is required");
                continue;
            }
            value = match spec.default_ref() {
                Some(DefaultValue::Value(default)) => Some(default.clone()),
                Some(DefaultValue::Call(callable)) => {
                    let outcome = {
                        let scope = CallScope::new(context, &values, None);
                        invoke_callable(callable, task, &scope)
                    };
                    match outcome {
                        Ok(default) => Some(default),
                        Err(error) => {
                            errors.add(&accessor, error.to_string());
                            continue;
                        }
                    }
                }
                None => None,
            };
        }

        // Absent and optional with no default: nothing is bound and nested
        // children are never evaluated.
        let Some(mut value) = value else { continue };

        if !spec.type_chain().is_empty() {
            match coercions.coerce_chain(spec.type_chain(), &value, &CoercionOptions::default()) {
                Ok(converted) => value = converted,
                Err(error) => {
                    errors.add(&accessor, error.message());
                    continue;
                }
            }
        }

        // Transforms run whenever a value is present, defaults included.
        if let Some(transform) = spec.transform_ref() {
            let outcome = {
                let scope = CallScope::new(context, &values, Some(&value));
                invoke_callable(transform, task, &scope)
            };
            match outcome {
                Ok(transformed) => value = transformed,
                Err(error) => {
                    errors.add(&accessor, error.to_string());
                    continue;
                }
            }
        }

        let mut rule_failed = false;
        for validation in spec.validations() {
            if validation.options.allow_nil && value.is_null() {
                continue;
            }
            let applies = {
                let scope = CallScope::new(context, &values, Some(&value));
                let wanted = validation.options.only_if.as_ref().map(|p| p.evaluate(&scope)).unwrap_or(true);
                let excused = validation.options.unless.as_ref().map(|p| p.evaluate(&scope)).unwrap_or(false);
                wanted && !excused
            };
            if !applies {
                continue;
            }
            // Unknown rule names are rejected at declaration verification.
            let Some(rule) = validators.lookup(&validation.rule) else { continue };
            if let Err(error) = rule(&value, &validation.options) {
                errors.add(&accessor, error.message());
                rule_failed = true;
            }
        }
        if rule_failed {
            continue;
        }

        if !spec.children().is_empty() {
            let node = value.as_object().cloned().unwrap_or_default();
            let child_output = resolve_level(spec.children(), &Store::Node(&node), context, task, coercions, validators);
            errors.merge_nested(&accessor, child_output.errors);

            // Fold coerced/defaulted children back into the parent value and
            // expose them under dotted accessor paths.
            if let Value::Object(parent) = &mut value {
                for (child_accessor, child_value) in &child_output.values {
                    if !child_accessor.contains('.') {
                        parent.insert(child_accessor.clone(), child_value.clone());
                    }
                }
            }
            for (child_accessor, child_value) in child_output.values {
                values.insert(format!("{}.{}", accessor, child_accessor), child_value);
            }
        }

        trace!(attribute = %accessor, "attribute resolved");
        values.insert(accessor, value);
    }

    ResolutionOutput { values, errors }
}

fn lookup_source(
    spec: &AttributeSpec,
    specs: &[AttributeSpec],
    store: &Store<'_>,
    resolved: &IndexMap<String, Value>,
    context: &Context,
    task: &dyn Task,
) -> Result<Option<Value>, String> {
    match spec.source_ref() {
        Source::Context => Ok(store.get(spec.name())),
        Source::Attribute(other) => {
            let accessor = specs
                .iter()
                .find(|candidate| candidate.name() == other)
                .map(|candidate| candidate.accessor_name())
                .unwrap_or_else(|| normalize_key(other));
            Ok(resolved.get(&accessor).cloned())
        }
        Source::Named(name) => {
            let scope = CallScope::new(context, resolved, None);
            invoke_callable(&Callable::Named(name.clone()), task, &scope)
                .map(Some)
                .map_err(|error| error.to_string())
        }
        Source::Call(callable) => {
            let scope = CallScope::new(context, resolved, None);
            invoke_callable(callable, task, &scope).map(Some).map_err(|error| error.to_string())
        }
    }
}
