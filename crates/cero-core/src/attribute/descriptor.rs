//! Attribute descriptors and the schema builder

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// Declared type of an attribute, resolved through the coercion registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
    Date,
}

impl AttrKind {
    /// Registry key for this type
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Date => "date",
        }
    }
}

/// Whether an attribute must be supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// Default for an omitted attribute: a value or a zero-arg closure
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Evaluate the default
    pub fn resolve(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Computed(f) => f(),
        }
    }
}

impl std::fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A named validation rule with its options bag
#[derive(Debug, Clone)]
pub struct RuleBinding {
    pub rule: String,
    pub options: Value,
}

/// One declared input slot of a task
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    pub name: String,
    pub presence: Presence,
    pub default: Option<DefaultValue>,
    pub kind: Option<AttrKind>,
    pub rules: Vec<RuleBinding>,
}

/// Builder for one attribute, produced by [`required`] or [`optional`]
///
/// # Example
///
/// ```
/// use cero_core::{required, AttrKind, Schema};
/// use serde_json::json;
///
/// let schema = Schema::new().attribute(
///     "name",
///     required()
///         .kind(AttrKind::String)
///         .rule("length", json!({"min": 1, "max": 50})),
/// );
/// assert_eq!(schema.names(), ["name"]);
/// ```
#[derive(Debug, Clone)]
pub struct AttributeBuilder {
    presence: Presence,
    default: Option<DefaultValue>,
    kind: Option<AttrKind>,
    rules: Vec<RuleBinding>,
}

/// Start a required attribute
pub fn required() -> AttributeBuilder {
    AttributeBuilder {
        presence: Presence::Required,
        default: None,
        kind: None,
        rules: Vec::new(),
    }
}

/// Start an optional attribute
pub fn optional() -> AttributeBuilder {
    AttributeBuilder {
        presence: Presence::Optional,
        ..required()
    }
}

impl AttributeBuilder {
    /// Default value substituted when the input omits the attribute
    pub fn default_value(mut self, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.default = Some(DefaultValue::Value(value));
        self
    }

    /// Default computed at resolution time
    pub fn default_with(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Computed(Arc::new(f)));
        self
    }

    /// Declared type, coerced through the registry before validation
    pub fn kind(mut self, kind: AttrKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Append a validation rule
    pub fn rule(mut self, name: impl Into<String>, options: Value) -> Self {
        self.rules.push(RuleBinding {
            rule: name.into(),
            options,
        });
        self
    }

    fn build(self, name: String) -> AttributeDescriptor {
        AttributeDescriptor {
            name,
            presence: self.presence,
            default: self.default,
            kind: self.kind,
            rules: self.rules,
        }
    }
}

/// Ordered list of attribute descriptors for one task type
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attributes: Vec<AttributeDescriptor>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute; resolution runs in declaration order
    pub fn attribute(mut self, name: impl Into<String>, builder: AttributeBuilder) -> Self {
        self.attributes.push(builder.build(name.into()));
        self
    }

    /// The declared descriptors in order
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Declared attribute names in order
    pub fn names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_collects_rules_in_order() {
        let schema = Schema::new().attribute(
            "code",
            required()
                .kind(AttrKind::String)
                .rule("length", json!({"is": 6}))
                .rule("format", json!({"with": "^[A-Z]+$"})),
        );

        let descriptor = &schema.attributes()[0];
        assert_eq!(descriptor.name, "code");
        assert_eq!(descriptor.presence, Presence::Required);
        assert_eq!(descriptor.kind, Some(AttrKind::String));
        assert_eq!(descriptor.rules.len(), 2);
        assert_eq!(descriptor.rules[0].rule, "length");
        assert_eq!(descriptor.rules[1].rule, "format");
    }

    #[test]
    fn test_defaults() {
        let fixed = required().default_value(7).build("n".to_string());
        assert_eq!(fixed.default.unwrap().resolve(), json!(7));

        let computed = optional()
            .default_with(|| json!("generated"))
            .build("token".to_string());
        assert_eq!(computed.default.unwrap().resolve(), json!("generated"));
    }

    #[test]
    fn test_kind_registry_names() {
        assert_eq!(AttrKind::Integer.name(), "integer");
        assert_eq!(AttrKind::Date.name(), "date");
    }
}
