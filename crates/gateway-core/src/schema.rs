//! Minimal JSON Schema validation for tool arguments and prompt renders.
//! Covers the subset of Draft 7 the reference tool/prompt catalog declares:
//! `type`, `properties`, `required`, `items`, `enum`. Collects every
//! offending path rather than failing fast, per the `invalid_arguments`
//! error kind's contract of naming each offending field.

use serde_json::Value;

/// Validates `data` against `schema`, returning the JSON-pointer-ish paths
/// of every violation found. An empty vec means the data is valid.
pub fn validate(data: &Value, schema: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    walk(data, schema, "$", &mut violations);
    violations
}

fn walk(data: &Value, schema: &Value, path: &str, violations: &mut Vec<String>) {
    if let Some(schema_type) = schema.get("type").and_then(Value::as_str) {
        let matches = match schema_type {
            "string" => data.is_string(),
            "number" => data.is_number(),
            "integer" => data.is_i64() || data.is_u64(),
            "boolean" => data.is_boolean(),
            "array" => data.is_array(),
            "object" => data.is_object(),
            _ => true,
        };
        if !matches {
            violations.push(format!("{path}: expected {schema_type}"));
            return;
        }
    }

    if let (Some(items_schema), Some(items)) = (schema.get("items"), data.as_array()) {
        for (i, item) in items.iter().enumerate() {
            walk(item, items_schema, &format!("{path}[{i}]"), violations);
        }
    }

    if let Some(obj) = data.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for req in required {
                if let Some(name) = req.as_str() {
                    if !obj.contains_key(name) {
                        violations.push(format!("{path}.{name}: missing required property"));
                    }
                }
            }
        }
        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (key, value) in obj {
                if let Some(prop_schema) = props.get(key) {
                    walk(value, prop_schema, &format!("{path}.{key}"), violations);
                }
            }
        }
    }

    if let Some(enum_values) = schema.get("enum").and_then(Value::as_array) {
        if !enum_values.contains(data) {
            violations.push(format!("{path}: must be one of {enum_values:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_property_is_named() {
        let schema = json!({
            "type": "object",
            "properties": {"subreddit": {"type": "string"}},
            "required": ["subreddit"]
        });
        let violations = validate(&json!({}), &schema);
        assert_eq!(violations, vec!["$.subreddit: missing required property"]);
    }

    #[test]
    fn wrong_type_is_named() {
        let schema = json!({
            "type": "object",
            "properties": {"limit": {"type": "integer"}}
        });
        let violations = validate(&json!({"limit": "ten"}), &schema);
        assert_eq!(violations, vec!["$.limit: expected integer"]);
    }

    #[test]
    fn valid_data_has_no_violations() {
        let schema = json!({
            "type": "object",
            "properties": {"subreddit": {"type": "string"}},
            "required": ["subreddit"]
        });
        assert!(validate(&json!({"subreddit": "rust"}), &schema).is_empty());
    }
}
