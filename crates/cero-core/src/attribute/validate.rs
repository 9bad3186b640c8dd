//! Built-in validation rules
//!
//! Rules run after coercion, in declaration order, and accumulate their
//! messages instead of short-circuiting. Each rule receives the coerced
//! value plus the full raw input (for cross-attribute rules such as
//! `confirmation`).

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::ValidationError;

/// The value under validation plus its surroundings
pub struct ValidationInput<'a> {
    /// Attribute name
    pub attribute: &'a str,

    /// Coerced value
    pub value: &'a Value,

    /// The caller's full raw input map
    pub input: &'a serde_json::Map<String, Value>,
}

/// A registered validation rule: `(input, options) -> ()`
pub type Validator =
    Arc<dyn Fn(&ValidationInput<'_>, &Value) -> Result<(), ValidationError> + Send + Sync>;

fn violation(check: &ValidationInput<'_>, rule: &str, message: String) -> ValidationError {
    ValidationError {
        attribute: check.attribute.to_string(),
        value: check.value.clone(),
        rule: rule.to_string(),
        message,
    }
}

/// Measured size of a value: characters for strings, elements for arrays
fn size_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

fn validate_length(check: &ValidationInput<'_>, options: &Value) -> Result<(), ValidationError> {
    let Some(size) = size_of(check.value) else {
        return Err(violation(check, "length", "has no length".to_string()));
    };

    if let Some(is) = options.get("is").and_then(Value::as_u64) {
        if size as u64 != is {
            return Err(violation(
                check,
                "length",
                format!("is the wrong length (should be {is})"),
            ));
        }
    }
    if let Some(min) = options.get("min").and_then(Value::as_u64) {
        if (size as u64) < min {
            return Err(violation(
                check,
                "length",
                format!("is too short (minimum is {min})"),
            ));
        }
    }
    if let Some(max) = options.get("max").and_then(Value::as_u64) {
        if size as u64 > max {
            return Err(violation(
                check,
                "length",
                format!("is too long (maximum is {max})"),
            ));
        }
    }
    Ok(())
}

fn validate_numeric(check: &ValidationInput<'_>, options: &Value) -> Result<(), ValidationError> {
    let Some(number) = check.value.as_f64() else {
        return Err(violation(check, "numeric", "is not a number".to_string()));
    };

    let only_integer = options
        .get("only_integer")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if only_integer && number.fract() != 0.0 {
        return Err(violation(check, "numeric", "must be an integer".to_string()));
    }
    if let Some(min) = options.get("min").and_then(Value::as_f64) {
        if number < min {
            return Err(violation(
                check,
                "numeric",
                format!("must be greater than or equal to {min}"),
            ));
        }
    }
    if let Some(max) = options.get("max").and_then(Value::as_f64) {
        if number > max {
            return Err(violation(
                check,
                "numeric",
                format!("must be less than or equal to {max}"),
            ));
        }
    }
    Ok(())
}

fn validate_format(check: &ValidationInput<'_>, options: &Value) -> Result<(), ValidationError> {
    let Some(pattern) = options.get("with").and_then(Value::as_str) else {
        return Err(violation(
            check,
            "format",
            "has a format rule without a pattern".to_string(),
        ));
    };
    let Ok(regex) = Regex::new(pattern) else {
        return Err(violation(
            check,
            "format",
            format!("has an invalid format pattern '{pattern}'"),
        ));
    };
    let Some(text) = check.value.as_str() else {
        return Err(violation(check, "format", "is invalid".to_string()));
    };
    if regex.is_match(text) {
        Ok(())
    } else {
        Err(violation(check, "format", "is invalid".to_string()))
    }
}

fn validate_inclusion(check: &ValidationInput<'_>, options: &Value) -> Result<(), ValidationError> {
    let allowed = options.get("in").and_then(Value::as_array);
    match allowed {
        Some(values) if values.contains(check.value) => Ok(()),
        _ => Err(violation(
            check,
            "inclusion",
            "is not included in the list".to_string(),
        )),
    }
}

fn validate_exclusion(check: &ValidationInput<'_>, options: &Value) -> Result<(), ValidationError> {
    let reserved = options.get("in").and_then(Value::as_array);
    match reserved {
        Some(values) if values.contains(check.value) => {
            Err(violation(check, "exclusion", "is reserved".to_string()))
        }
        _ => Ok(()),
    }
}

fn validate_presence(check: &ValidationInput<'_>, _options: &Value) -> Result<(), ValidationError> {
    let blank = match check.value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    };
    if blank {
        Err(violation(check, "presence", "can't be blank".to_string()))
    } else {
        Ok(())
    }
}

/// Compares the attribute against `<attribute>_confirmation` in the input
fn validate_confirmation(
    check: &ValidationInput<'_>,
    _options: &Value,
) -> Result<(), ValidationError> {
    let confirmation_key = format!("{}_confirmation", check.attribute);
    if check.input.get(&confirmation_key) == Some(check.value) {
        Ok(())
    } else {
        Err(violation(
            check,
            "confirmation",
            "doesn't match confirmation".to_string(),
        ))
    }
}

/// The default validator registry, keyed by rule name
pub fn builtin_validators() -> HashMap<String, Validator> {
    let mut registry: HashMap<String, Validator> = HashMap::new();
    registry.insert("length".to_string(), Arc::new(validate_length));
    registry.insert("numeric".to_string(), Arc::new(validate_numeric));
    registry.insert("format".to_string(), Arc::new(validate_format));
    registry.insert("inclusion".to_string(), Arc::new(validate_inclusion));
    registry.insert("exclusion".to_string(), Arc::new(validate_exclusion));
    registry.insert("presence".to_string(), Arc::new(validate_presence));
    registry.insert("confirmation".to_string(), Arc::new(validate_confirmation));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn check<'a>(attribute: &'a str, value: &'a Value, input: &'a Map<String, Value>) -> ValidationInput<'a> {
        ValidationInput {
            attribute,
            value,
            input,
        }
    }

    #[test]
    fn test_length_bounds() {
        let input = Map::new();
        let empty = json!("");
        let err = validate_length(&check("name", &empty, &input), &json!({"min": 1})).unwrap_err();
        assert_eq!(err.message, "is too short (minimum is 1)");
        assert_eq!(err.rule, "length");

        let long = json!("abcdef");
        let err = validate_length(&check("name", &long, &input), &json!({"max": 3})).unwrap_err();
        assert_eq!(err.message, "is too long (maximum is 3)");

        let items = json!([1, 2, 3]);
        assert!(validate_length(&check("items", &items, &input), &json!({"is": 3})).is_ok());
    }

    #[test]
    fn test_numeric_bounds() {
        let input = Map::new();
        let n = json!(5);
        assert!(validate_numeric(&check("n", &n, &input), &json!({"min": 1, "max": 10})).is_ok());

        let err =
            validate_numeric(&check("n", &n, &input), &json!({"min": 6})).unwrap_err();
        assert_eq!(err.message, "must be greater than or equal to 6");

        let f = json!(1.5);
        let err =
            validate_numeric(&check("n", &f, &input), &json!({"only_integer": true})).unwrap_err();
        assert_eq!(err.message, "must be an integer");

        let s = json!("abc");
        let err = validate_numeric(&check("n", &s, &input), &json!({})).unwrap_err();
        assert_eq!(err.message, "is not a number");
    }

    #[test]
    fn test_format() {
        let input = Map::new();
        let ok = json!("ABC123");
        assert!(validate_format(&check("code", &ok, &input), &json!({"with": "^[A-Z0-9]+$"})).is_ok());

        let bad = json!("abc!");
        let err =
            validate_format(&check("code", &bad, &input), &json!({"with": "^[A-Z0-9]+$"}))
                .unwrap_err();
        assert_eq!(err.message, "is invalid");
    }

    #[test]
    fn test_inclusion_exclusion() {
        let input = Map::new();
        let us = json!("US");
        assert!(
            validate_inclusion(&check("country", &us, &input), &json!({"in": ["US", "CA"]}))
                .is_ok()
        );
        assert!(
            validate_inclusion(&check("country", &us, &input), &json!({"in": ["DE"]})).is_err()
        );

        let admin = json!("admin");
        let err =
            validate_exclusion(&check("user", &admin, &input), &json!({"in": ["admin", "root"]}))
                .unwrap_err();
        assert_eq!(err.message, "is reserved");
    }

    #[test]
    fn test_presence() {
        let input = Map::new();
        let blank = json!("   ");
        assert!(validate_presence(&check("name", &blank, &input), &json!({})).is_err());

        let present = json!("x");
        assert!(validate_presence(&check("name", &present, &input), &json!({})).is_ok());
    }

    #[test]
    fn test_confirmation() {
        let mut input = Map::new();
        input.insert("password".to_string(), json!("secret"));
        input.insert("password_confirmation".to_string(), json!("secret"));

        let value = json!("secret");
        assert!(validate_confirmation(&check("password", &value, &input), &json!({})).is_ok());

        input.insert("password_confirmation".to_string(), json!("other"));
        let err =
            validate_confirmation(&check("password", &value, &input), &json!({})).unwrap_err();
        assert_eq!(err.message, "doesn't match confirmation");
    }
}
