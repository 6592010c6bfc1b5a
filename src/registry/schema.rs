//! Argument validation against JSON-schema-like tool parameter definitions.
//!
//! Supports the subset tool schemas actually use: required fields, the six
//! primitive/container types, nested object and array schemas, `enum`,
//! numeric `minimum`/`maximum`, and string `minLength`/`maxLength`/`pattern`.

use regex::Regex;
use serde_json::Value;

/// Validate `data` against `schema`. Returns every violation found, with a
/// dotted field path per message.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    validate_value(data, schema, "", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_value(data: &Value, schema: &Value, path: &str, errors: &mut Vec<String>) {
    if let Some(type_name) = schema.get("type").and_then(|t| t.as_str()) {
        if !type_matches(data, type_name) {
            errors.push(format!(
                "{}: expected {}, got {}",
                display_path(path),
                type_name,
                type_of(data)
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(data) {
            errors.push(format!(
                "{}: value not in enum {}",
                display_path(path),
                serde_json::to_string(allowed).unwrap_or_default()
            ));
        }
    }

    match data {
        Value::String(s) => validate_string(s, schema, path, errors),
        Value::Number(_) => validate_number(data, schema, path, errors),
        Value::Object(map) => {
            if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
                for field in required.iter().filter_map(|f| f.as_str()) {
                    if !map.contains_key(field) {
                        errors.push(format!(
                            "{}: missing required field '{}'",
                            display_path(path),
                            field
                        ));
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
                for (field, field_schema) in properties {
                    if let Some(field_value) = map.get(field) {
                        let child = join_path(path, field);
                        validate_value(field_value, field_schema, &child, errors);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    let child = format!("{}[{}]", display_path(path), i);
                    validate_value(item, item_schema, &child, errors);
                }
            }
        }
        _ => {}
    }
}

fn validate_string(s: &str, schema: &Value, path: &str, errors: &mut Vec<String>) {
    let len = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(|m| m.as_u64()) {
        if len < min {
            errors.push(format!(
                "{}: length {} below minLength {}",
                display_path(path),
                len,
                min
            ));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(|m| m.as_u64()) {
        if len > max {
            errors.push(format!(
                "{}: length {} above maxLength {}",
                display_path(path),
                len,
                max
            ));
        }
    }
    if let Some(pattern) = schema.get("pattern").and_then(|p| p.as_str()) {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(s) {
                    errors.push(format!(
                        "{}: value does not match pattern {}",
                        display_path(path),
                        pattern
                    ));
                }
            }
            Err(_) => errors.push(format!(
                "{}: schema pattern {} is not a valid regex",
                display_path(path),
                pattern
            )),
        }
    }
}

fn validate_number(data: &Value, schema: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(n) = data.as_f64() else { return };
    if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
        if n < min {
            errors.push(format!("{}: {} below minimum {}", display_path(path), n, min));
        }
    }
    if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
        if n > max {
            errors.push(format!("{}: {} above maximum {}", display_path(path), n, max));
        }
    }
}

fn type_matches(data: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => data.is_string(),
        "number" => data.is_number(),
        // A float with no fractional part is not an integer on the wire.
        "integer" => data.is_i64() || data.is_u64(),
        "boolean" => data.is_boolean(),
        "object" => data.is_object(),
        "array" => data.is_array(),
        "null" => data.is_null(),
        _ => true,
    }
}

fn type_of(data: &Value) -> &'static str {
    match data {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "arguments"
    } else {
        path
    }
}

fn join_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_number_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"}
            },
            "required": ["a", "b"]
        })
    }

    #[test]
    fn accepts_matching_arguments() {
        assert!(validate(&two_number_schema(), &json!({"a": 1.5, "b": 3})).is_ok());
    }

    #[test]
    fn rejects_wrong_type() {
        let errors = validate(&two_number_schema(), &json!({"a": "x", "b": 3})).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("a: expected number"));
    }

    #[test]
    fn rejects_missing_required_field() {
        let errors = validate(&two_number_schema(), &json!({"a": 1})).unwrap_err();
        assert!(errors[0].contains("missing required field 'b'"));
    }

    #[test]
    fn integer_rejects_float() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "integer"}}});
        assert!(validate(&schema, &json!({"n": 2})).is_ok());
        assert!(validate(&schema, &json!({"n": 2.5})).is_err());
    }

    #[test]
    fn enum_constraint() {
        let schema = json!({"type": "object", "properties": {"mode": {"type": "string", "enum": ["fast", "slow"]}}});
        assert!(validate(&schema, &json!({"mode": "fast"})).is_ok());
        assert!(validate(&schema, &json!({"mode": "medium"})).is_err());
    }

    #[test]
    fn numeric_bounds() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "number", "minimum": 0, "maximum": 10}}});
        assert!(validate(&schema, &json!({"n": 5})).is_ok());
        assert!(validate(&schema, &json!({"n": -1})).is_err());
        assert!(validate(&schema, &json!({"n": 11})).is_err());
    }

    #[test]
    fn string_length_and_pattern() {
        let schema = json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "minLength": 2, "maxLength": 4, "pattern": "^[a-z]+$"}
            }
        });
        assert!(validate(&schema, &json!({"code": "abc"})).is_ok());
        assert!(validate(&schema, &json!({"code": "a"})).is_err());
        assert!(validate(&schema, &json!({"code": "abcde"})).is_err());
        assert!(validate(&schema, &json!({"code": "AB"})).is_err());
    }

    #[test]
    fn nested_object_and_array() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"id": {"type": "integer"}},
                        "required": ["id"]
                    }
                }
            }
        });
        assert!(validate(&schema, &json!({"items": [{"id": 1}, {"id": 2}]})).is_ok());
        let errors = validate(&schema, &json!({"items": [{"id": 1}, {}]})).unwrap_err();
        assert!(errors[0].contains("items[1]"));
    }

    #[test]
    fn extra_fields_are_tolerated() {
        assert!(validate(&two_number_schema(), &json!({"a": 1, "b": 2, "c": "extra"})).is_ok());
    }
}
