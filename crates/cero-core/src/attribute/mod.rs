//! Declarative task inputs
//!
//! A task declares its input surface as a [`Schema`] of named attribute
//! descriptors. Before `work` runs, the engine resolves the caller's input
//! against the schema: defaults are substituted, declared types are coerced
//! through the coercion registry, and validation rules accumulate into an
//! [`ErrorCollection`](crate::ErrorCollection). Any error fails the task
//! with reason `"Invalid"` without invoking `work`.

mod coerce;
mod descriptor;
mod validate;

pub use coerce::{builtin_coercions, Coercer};
pub use descriptor::{
    optional, required, AttrKind, AttributeBuilder, AttributeDescriptor, DefaultValue, Presence,
    RuleBinding, Schema,
};
pub use validate::{builtin_validators, ValidationInput, Validator};

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::ErrorCollection;

/// Resolve caller input against a schema
///
/// Runs defaults, coercion and validation in declaration order and returns
/// the resolved attribute map, or the accumulated errors.
pub(crate) fn resolve_attributes(
    schema: &Schema,
    input: &Map<String, Value>,
    coercions: &HashMap<String, Coercer>,
    validators: &HashMap<String, Validator>,
) -> Result<Map<String, Value>, ErrorCollection> {
    let mut resolved = Map::new();
    let mut errors = ErrorCollection::new();

    for descriptor in schema.attributes() {
        let name = descriptor.name.as_str();
        let mut value = match input.get(name) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v.clone()),
        };

        if value.is_none() {
            if let Some(default) = &descriptor.default {
                value = Some(default.resolve());
            }
        }

        let Some(mut value) = value else {
            if descriptor.presence == Presence::Required {
                errors.add(name, "can't be blank");
            }
            continue;
        };

        if let Some(kind) = descriptor.kind {
            match coercions.get(kind.name()) {
                Some(coercer) => match coercer(name, &value) {
                    Ok(coerced) => value = coerced,
                    Err(e) => {
                        errors.add(name, format!("is not a valid {}", e.target));
                        continue;
                    }
                },
                None => {
                    errors.add(name, format!("has no coercion for type '{}'", kind.name()));
                    continue;
                }
            }
        }

        for binding in &descriptor.rules {
            let Some(validator) = validators.get(binding.rule.as_str()) else {
                errors.add(name, format!("has unknown validation rule '{}'", binding.rule));
                continue;
            };
            let check = ValidationInput {
                attribute: name,
                value: &value,
                input,
            };
            if let Err(e) = validator(&check, &binding.options) {
                errors.add(name, e.message);
            }
        }

        resolved.insert(name.to_string(), value);
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(errors)
    }
}
