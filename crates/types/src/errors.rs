//! Structured validation failure payload.
//!
//! When attribute resolution fails, every failure across every attribute is
//! collected into one [`ValidationErrors`] aggregate rather than surfacing
//! one problem at a time. The serialized shape is a stable contract for log
//! and wire consumers:
//!
//! ```json
//! {
//!   "full_message": "age could not coerce into an integer. address.city is required",
//!   "messages": { "age": ["could not coerce into an integer"], "address.city": ["is required"] }
//! }
//! ```
//!
//! Nested attribute failures use a dotted path (`parent.child`) as the key.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Aggregate of per-attribute validation failure messages.
///
/// Keys are attribute names or dotted paths for nested attributes; values
/// are the failure texts collected for that attribute, in rule order. Entry
/// order follows declaration order, which keeps serialized output and
/// `full_message` deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationErrors {
    messages: IndexMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Creates an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failure message for an attribute name or dotted path.
    pub fn add(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.messages.entry(path.into()).or_default().push(message.into());
    }

    /// Absorbs another aggregate, re-keying its entries under `prefix.`.
    ///
    /// Used when child declarations report failures that must surface on the
    /// parent as dotted paths.
    pub fn merge_nested(&mut self, prefix: &str, other: ValidationErrors) {
        for (path, texts) in other.messages {
            let nested_path = format!("{}.{}", prefix, path);
            self.messages.entry(nested_path).or_default().extend(texts);
        }
    }

    /// Absorbs another aggregate at the same level.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (path, texts) in other.messages {
            self.messages.entry(path).or_default().extend(texts);
        }
    }

    /// True when no failures have been recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of attributes with at least one failure.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Failure texts for one attribute, if any were recorded.
    pub fn messages_for(&self, path: &str) -> Option<&[String]> {
        self.messages.get(path).map(Vec::as_slice)
    }

    /// Iterates `(path, messages)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.messages.iter().map(|(path, texts)| (path.as_str(), texts.as_slice()))
    }

    /// Joined text of all failures, one sentence per attribute.
    pub fn full_message(&self) -> String {
        self.messages
            .iter()
            .flat_map(|(path, texts)| texts.iter().map(move |text| format!("{} {}", path, text)))
            .collect::<Vec<_>>()
            .join(". ")
    }

    /// The stable log-facing JSON shape: `{ full_message, messages }`.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "full_message": self.full_message(),
            "messages": self.messages,
        })
    }
}
