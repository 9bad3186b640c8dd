//! Framework error taxonomy
//!
//! Framework errors never propagate out of the engine: they are converted to
//! failed results with structured metadata. Only the strict entry points
//! surface failures to the caller.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root error type of the framework
#[derive(Debug, thiserror::Error)]
pub enum CeroError {
    /// Input value could not be coerced to the declared type
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// Input value violated a validation rule
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Execution exceeded a configured time limit
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// A required attribute was absent from the input
    #[error("attribute '{attribute}' can't be blank")]
    MissingAttribute { attribute: String },
}

/// Coercion failure for one attribute
#[derive(Debug, Clone, thiserror::Error)]
#[error("could not coerce '{attribute}' into {target}")]
pub struct CoercionError {
    /// Attribute being coerced
    pub attribute: String,

    /// The offending input value
    pub value: Value,

    /// Target type name
    pub target: String,
}

/// Validation failure for one attribute
#[derive(Debug, Clone, thiserror::Error)]
#[error("{attribute} {message}")]
pub struct ValidationError {
    /// Attribute being validated
    pub attribute: String,

    /// The offending input value
    pub value: Value,

    /// Rule that rejected the value
    pub rule: String,

    /// Human-readable message, e.g. "is too short (minimum is 1)"
    pub message: String,
}

/// Execution exceeded a time limit
#[derive(Debug, Clone, thiserror::Error)]
#[error("execution timed out after {limit:?}")]
pub struct TimeoutError {
    /// The configured limit
    pub limit: Duration,
}

/// Attribute-keyed collection of validation messages
///
/// Serializes as `{"messages": {"name": ["can't be blank"]}}` so failed
/// results carry the full picture under `metadata.errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorCollection {
    messages: BTreeMap<String, Vec<String>>,
}

impl ErrorCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message for an attribute
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.messages
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    /// Check whether an attribute has any messages
    pub fn has(&self, attribute: &str) -> bool {
        self.messages.contains_key(attribute)
    }

    /// Messages recorded for an attribute
    pub fn get(&self, attribute: &str) -> &[String] {
        self.messages.get(attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total number of messages
    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    /// One combined message, e.g. "name can't be blank; age is not a number"
    pub fn full_message(&self) -> String {
        self.messages
            .iter()
            .flat_map(|(attribute, messages)| {
                messages
                    .iter()
                    .map(move |message| format!("{attribute} {message}"))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Iterate `(attribute, message)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.messages.iter().flat_map(|(attribute, messages)| {
            messages
                .iter()
                .map(move |message| (attribute.as_str(), message.as_str()))
        })
    }
}

impl<'a> IntoIterator for &'a ErrorCollection {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl std::fmt::Display for ErrorCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_accumulates() {
        let mut errors = ErrorCollection::new();
        assert!(errors.is_empty());

        errors.add("name", "can't be blank");
        errors.add("name", "is too short (minimum is 1)");
        errors.add("age", "is not a number");

        assert!(errors.has("name"));
        assert!(!errors.has("email"));
        assert_eq!(errors.get("name").len(), 2);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_full_message() {
        let mut errors = ErrorCollection::new();
        errors.add("age", "is not a number");
        errors.add("name", "can't be blank");

        assert_eq!(
            errors.full_message(),
            "age is not a number; name can't be blank"
        );
    }

    #[test]
    fn test_serialization_shape() {
        let mut errors = ErrorCollection::new();
        errors.add("name", "can't be blank");

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, json!({"messages": {"name": ["can't be blank"]}}));
    }

    #[test]
    fn test_iteration() {
        let mut errors = ErrorCollection::new();
        errors.add("a", "first");
        errors.add("b", "second");

        let pairs: Vec<_> = (&errors).into_iter().collect();
        assert_eq!(pairs, vec![("a", "first"), ("b", "second")]);
    }

    #[test]
    fn test_error_display() {
        let error = CoercionError {
            attribute: "age".to_string(),
            value: json!("abc"),
            target: "integer".to_string(),
        };
        assert_eq!(error.to_string(), "could not coerce 'age' into integer");

        let error = ValidationError {
            attribute: "name".to_string(),
            value: json!(""),
            rule: "length".to_string(),
            message: "is too short (minimum is 1)".to_string(),
        };
        assert_eq!(error.to_string(), "name is too short (minimum is 1)");
    }
}
