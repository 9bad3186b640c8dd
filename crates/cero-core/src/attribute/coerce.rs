//! Built-in type coercions
//!
//! Coercion is lossy-safe: common alternate representations are accepted
//! (numeric strings, `"true"`/`"1"` booleans, ISO 8601 date strings) and
//! anything else produces a structured [`CoercionError`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Number, Value};

use crate::error::CoercionError;

/// A registered coercion: `(attribute, value) -> coerced value`
pub type Coercer = Arc<dyn Fn(&str, &Value) -> Result<Value, CoercionError> + Send + Sync>;

fn error(attribute: &str, value: &Value, target: &str) -> CoercionError {
    CoercionError {
        attribute: attribute.to_string(),
        value: value.clone(),
        target: target.to_string(),
    }
}

fn coerce_string(attribute: &str, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        _ => Err(error(attribute, value, "string")),
    }
}

fn coerce_integer(attribute: &str, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
            _ => Err(error(attribute, value, "integer")),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| error(attribute, value, "integer")),
        _ => Err(error(attribute, value, "integer")),
    }
}

fn coerce_float(attribute: &str, value: &Value) -> Result<Value, CoercionError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| error(attribute, value, "float"))
}

fn coerce_boolean(attribute: &str, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(error(attribute, value, "boolean")),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(error(attribute, value, "boolean")),
        },
        _ => Err(error(attribute, value, "boolean")),
    }
}

fn coerce_array(attribute: &str, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Array(_) => Ok(value.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Array(_)) => Ok(parsed),
            _ => Err(error(attribute, value, "array")),
        },
        _ => Err(error(attribute, value, "array")),
    }
}

fn coerce_object(attribute: &str, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => Ok(parsed),
            _ => Err(error(attribute, value, "object")),
        },
        _ => Err(error(attribute, value, "object")),
    }
}

/// Dates normalize to RFC 3339 strings in UTC
fn coerce_date(attribute: &str, value: &Value) -> Result<Value, CoercionError> {
    let Value::String(s) = value else {
        return Err(error(attribute, value, "date"));
    };
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Value::String(dt.with_timezone(&Utc).to_rfc3339()));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let dt = d
            .and_hms_opt(0, 0, 0)
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        if let Some(dt) = dt {
            return Ok(Value::String(dt.to_rfc3339()));
        }
    }
    Err(error(attribute, value, "date"))
}

/// The default coercion registry, keyed by type name
pub fn builtin_coercions() -> HashMap<String, Coercer> {
    let mut registry: HashMap<String, Coercer> = HashMap::new();
    registry.insert("string".to_string(), Arc::new(coerce_string));
    registry.insert("integer".to_string(), Arc::new(coerce_integer));
    registry.insert("float".to_string(), Arc::new(coerce_float));
    registry.insert("boolean".to_string(), Arc::new(coerce_boolean));
    registry.insert("array".to_string(), Arc::new(coerce_array));
    registry.insert("object".to_string(), Arc::new(coerce_object));
    registry.insert("date".to_string(), Arc::new(coerce_date));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_representations() {
        assert_eq!(coerce_integer("n", &json!(42)).unwrap(), json!(42));
        assert_eq!(coerce_integer("n", &json!("42")).unwrap(), json!(42));
        assert_eq!(coerce_integer("n", &json!(" 7 ")).unwrap(), json!(7));
        assert_eq!(coerce_integer("n", &json!(3.0)).unwrap(), json!(3));
        assert!(coerce_integer("n", &json!(3.5)).is_err());
        assert!(coerce_integer("n", &json!("abc")).is_err());
    }

    #[test]
    fn test_boolean_representations() {
        for truthy in ["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(coerce_boolean("b", &json!(truthy)).unwrap(), json!(true));
        }
        for falsy in ["false", "0", "no", "off"] {
            assert_eq!(coerce_boolean("b", &json!(falsy)).unwrap(), json!(false));
        }
        assert_eq!(coerce_boolean("b", &json!(1)).unwrap(), json!(true));
        assert!(coerce_boolean("b", &json!("maybe")).is_err());
    }

    #[test]
    fn test_float_and_string() {
        assert_eq!(coerce_float("f", &json!("2.5")).unwrap(), json!(2.5));
        assert_eq!(coerce_float("f", &json!(2)).unwrap(), json!(2.0));
        assert!(coerce_float("f", &json!([])).is_err());

        assert_eq!(coerce_string("s", &json!(10)).unwrap(), json!("10"));
        assert!(coerce_string("s", &json!({})).is_err());
    }

    #[test]
    fn test_container_parsing() {
        assert_eq!(
            coerce_array("a", &json!("[1, 2]")).unwrap(),
            json!([1, 2])
        );
        assert!(coerce_array("a", &json!("{}")).is_err());
        assert_eq!(
            coerce_object("o", &json!(r#"{"k": 1}"#)).unwrap(),
            json!({"k": 1})
        );
    }

    #[test]
    fn test_date_parsing() {
        let rfc = coerce_date("d", &json!("2024-01-15T10:30:00Z")).unwrap();
        assert!(rfc.as_str().unwrap().starts_with("2024-01-15T10:30:00"));

        let day = coerce_date("d", &json!("2024-01-15")).unwrap();
        assert!(day.as_str().unwrap().starts_with("2024-01-15T00:00:00"));

        let err = coerce_date("d", &json!("yesterday")).unwrap_err();
        assert_eq!(err.attribute, "d");
        assert_eq!(err.target, "date");
    }
}
