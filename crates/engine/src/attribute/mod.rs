//! Attribute declarations.
//!
//! A task declares each named input as an [`AttributeSpec`]: where the raw
//! value comes from, whether it is required, which types to try coercing it
//! into, its default, transform, validation rules, and (for structured
//! inputs) nested child declarations. Declarations are built once per task
//! type and read on every invocation; declaration order is significant
//! because later declarations may name earlier ones as their source.
//!
//! Malformed declarations are programmer errors ([`DeclarationError`]),
//! surfaced when the executor first materializes a task's declarations and
//! never caught by the engine.

pub mod coerce;
pub mod resolver;
pub mod validate;

use serde_json::Value;
use thiserror::Error;

use crate::callable::{Callable, Predicate};
use crate::context::normalize_key;

pub use coerce::{CoercionError, CoercionOptions, CoercionRegistry};
pub use validate::{RuleError, RuleOptions, ValidatorRegistry};

/// Where an attribute's raw value is looked up.
#[derive(Debug, Clone, Default)]
pub enum Source {
    /// The shared context, by normalized attribute name.
    #[default]
    Context,
    /// Another attribute declared earlier on the same task.
    Attribute(String),
    /// A routine named on the task instance.
    Named(String),
    /// An injected callable.
    Call(Callable),
}

/// Whether an attribute must be present, possibly decided per invocation.
#[derive(Debug, Clone, Default)]
pub enum Requirement {
    Always,
    #[default]
    Never,
    /// Evaluated against the invocation's scope each time.
    When(Predicate),
}

impl Requirement {
    pub(crate) fn evaluate(&self, scope: &crate::callable::CallScope) -> bool {
        match self {
            Requirement::Always => true,
            Requirement::Never => false,
            Requirement::When(predicate) => predicate.evaluate(scope),
        }
    }
}

/// Default applied when the source yields no value.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Value(Value),
    Call(Callable),
}

/// One validation rule reference with its options.
#[derive(Debug, Clone)]
pub struct ValidationSpec {
    pub rule: String,
    pub options: RuleOptions,
}

impl ValidationSpec {
    pub fn new(rule: impl Into<String>, options: RuleOptions) -> Self {
        Self { rule: rule.into(), options }
    }
}

/// Immutable declaration of one named input.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    name: String,
    source: Source,
    required: Requirement,
    types: Vec<String>,
    default: Option<DefaultValue>,
    transform: Option<Callable>,
    validations: Vec<ValidationSpec>,
    prefix: Option<String>,
    suffix: Option<String>,
    rename: Option<String>,
    children: Vec<AttributeSpec>,
}

impl AttributeSpec {
    /// Declares an optional attribute.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Source::default(),
            required: Requirement::Never,
            types: Vec::new(),
            default: None,
            transform: None,
            validations: Vec::new(),
            prefix: None,
            suffix: None,
            rename: None,
            children: Vec::new(),
        }
    }

    /// Declares a required attribute.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            required: Requirement::Always,
            ..Self::optional(name)
        }
    }

    /// Overrides where the raw value is looked up.
    pub fn source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Makes the requirement conditional, evaluated per invocation.
    pub fn required_when(mut self, predicate: Predicate) -> Self {
        self.required = Requirement::When(predicate);
        self
    }

    /// Declares the ordered coercion fallback chain.
    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Declares a single coercion type.
    pub fn coerce(self, type_name: impl Into<String>) -> Self {
        self.types([type_name.into()])
    }

    /// Declares a plain default value.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Value(value));
        self
    }

    /// Declares a callable default, resolved against the task instance.
    pub fn default_with(mut self, callable: Callable) -> Self {
        self.default = Some(DefaultValue::Call(callable));
        self
    }

    /// Declares a transform applied after coercion, even to defaulted
    /// values.
    pub fn transform(mut self, callable: Callable) -> Self {
        self.transform = Some(callable);
        self
    }

    /// Appends one validation rule.
    pub fn validate(mut self, validation: ValidationSpec) -> Self {
        self.validations.push(validation);
        self
    }

    /// Prefixes the accessor name.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Suffixes the accessor name.
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Renames the accessor outright. Exclusive with prefix/suffix.
    pub fn rename(mut self, rename: impl Into<String>) -> Self {
        self.rename = Some(rename.into());
        self
    }

    /// Appends one nested child declaration.
    pub fn child(mut self, child: AttributeSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn source_ref(&self) -> &Source {
        &self.source
    }

    pub(crate) fn requirement(&self) -> &Requirement {
        &self.required
    }

    pub(crate) fn type_chain(&self) -> &[String] {
        &self.types
    }

    pub(crate) fn default_ref(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub(crate) fn transform_ref(&self) -> Option<&Callable> {
        self.transform.as_ref()
    }

    pub(crate) fn validations(&self) -> &[ValidationSpec] {
        &self.validations
    }

    pub(crate) fn children(&self) -> &[AttributeSpec] {
        &self.children
    }

    /// The normalized name the resolved value is bound under, with
    /// prefix/suffix/rename applied exactly once.
    pub fn accessor_name(&self) -> String {
        if let Some(rename) = &self.rename {
            return normalize_key(rename);
        }
        let mut accessor = String::new();
        if let Some(prefix) = &self.prefix {
            accessor.push_str(prefix);
        }
        accessor.push_str(&self.name);
        if let Some(suffix) = &self.suffix {
            accessor.push_str(suffix);
        }
        normalize_key(&accessor)
    }
}

/// Malformed declarations, always fatal.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("duplicate attribute declaration '{name}'")]
    Duplicate { name: String },

    #[error("attribute '{name}' declares unknown coercion type '{type_name}'")]
    UnknownType { name: String, type_name: String },

    #[error("attribute '{name}' declares unknown validation rule '{rule}'")]
    UnknownRule { name: String, rule: String },

    #[error("attribute '{name}' combines rename with prefix/suffix")]
    ConflictingNaming { name: String },

    #[error("attribute '{name}' is sourced from attribute '{origin}' which is not declared before it")]
    UnknownAttributeSource { name: String, origin: String },
}

/// Checks a declaration list for programmer errors, recursively.
pub(crate) fn verify_specs(
    specs: &[AttributeSpec],
    coercions: &CoercionRegistry,
    validators: &ValidatorRegistry,
) -> Result<(), DeclarationError> {
    let mut seen: Vec<String> = Vec::new();
    for spec in specs {
        let accessor = spec.accessor_name();
        if seen.contains(&accessor) {
            return Err(DeclarationError::Duplicate { name: accessor });
        }
        if spec.rename.is_some() && (spec.prefix.is_some() || spec.suffix.is_some()) {
            return Err(DeclarationError::ConflictingNaming { name: spec.name.clone() });
        }
        for type_name in spec.type_chain() {
            if !coercions.knows(type_name) {
                return Err(DeclarationError::UnknownType {
                    name: spec.name.clone(),
                    type_name: type_name.clone(),
                });
            }
        }
        for validation in spec.validations() {
            if !validators.knows(&validation.rule) {
                return Err(DeclarationError::UnknownRule {
                    name: spec.name.clone(),
                    rule: validation.rule.clone(),
                });
            }
        }
        if let Source::Attribute(source_name) = spec.source_ref() {
            let declared_earlier = specs
                .iter()
                .take_while(|candidate| !std::ptr::eq(*candidate, spec))
                .any(|candidate| candidate.name() == source_name);
            if !declared_earlier {
                return Err(DeclarationError::UnknownAttributeSource {
                    name: spec.name.clone(),
                    origin: source_name.clone(),
                });
            }
        }
        verify_specs(spec.children(), coercions, validators)?;
        seen.push(accessor);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessor_name_applies_prefix_suffix_once() {
        let spec = AttributeSpec::optional("name").prefix("user_").suffix("_value");
        assert_eq!(spec.accessor_name(), "user_name_value");

        let renamed = AttributeSpec::optional("name").rename("fullName");
        assert_eq!(renamed.accessor_name(), "full_name");
    }

    #[test]
    fn duplicate_accessors_are_declaration_errors() {
        let specs = vec![AttributeSpec::optional("name"), AttributeSpec::optional("other").rename("name")];
        let error = verify_specs(&specs, &CoercionRegistry::default(), &ValidatorRegistry::default()).unwrap_err();
        assert!(matches!(error, DeclarationError::Duplicate { .. }));
    }

    #[test]
    fn attribute_sources_must_be_declared_earlier() {
        let specs = vec![
            AttributeSpec::optional("derived").source(Source::Attribute("base".into())),
            AttributeSpec::optional("base"),
        ];
        let error = verify_specs(&specs, &CoercionRegistry::default(), &ValidatorRegistry::default()).unwrap_err();
        assert!(matches!(error, DeclarationError::UnknownAttributeSource { .. }));
        assert_eq!(
            error.to_string(),
            "attribute 'derived' is sourced from attribute 'base' which is not declared before it"
        );
        // Declaration errors are plain diagnostics; nothing chains beneath them.
        assert!(std::error::Error::source(&error).is_none());

        let ordered = vec![
            AttributeSpec::optional("base"),
            AttributeSpec::optional("derived").source(Source::Attribute("base".into())),
        ];
        assert!(verify_specs(&ordered, &CoercionRegistry::default(), &ValidatorRegistry::default()).is_ok());
    }

    #[test]
    fn unknown_type_names_are_declaration_errors() {
        let specs = vec![AttributeSpec::optional("age").coerce("quaternion")];
        let error = verify_specs(&specs, &CoercionRegistry::default(), &ValidatorRegistry::default()).unwrap_err();
        assert!(matches!(error, DeclarationError::UnknownType { .. }));
    }

    #[test]
    fn nested_declarations_are_verified_too() {
        let specs = vec![AttributeSpec::optional("address").child(AttributeSpec::required("city").coerce("nonsense"))];
        let error = verify_specs(&specs, &CoercionRegistry::default(), &ValidatorRegistry::default()).unwrap_err();
        assert!(matches!(error, DeclarationError::UnknownType { .. }));
    }
}
