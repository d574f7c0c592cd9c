//! Input schema descriptors and pre-handler validation.
//!
//! Schemas are JSON-Schema-shaped object descriptors with a required-field
//! list; validation runs before the handler so handlers can assume shape.

use serde_json::{json, Value};

/// One field in an object schema.
#[derive(Clone, Copy)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
}

impl SchemaField {
    pub const fn new(name: &'static str, kind: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
        }
    }
}

/// Builds an object schema from field descriptors and a required list.
pub fn object_schema(fields: &[SchemaField], required: &[&str]) -> Value {
    let mut props = serde_json::Map::new();
    for field in fields {
        props.insert(
            field.name.to_string(),
            json!({ "type": field.kind, "description": field.description }),
        );
    }
    json!({
        "type": "object",
        "properties": props,
        "required": required,
    })
}

/// Validates `args` against an object schema: required fields present,
/// declared types respected. Unknown fields pass through.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let obj = match args {
        Value::Object(obj) => obj,
        Value::Null => {
            return match schema.get("required").and_then(Value::as_array) {
                Some(required) if !required.is_empty() => {
                    Err(format!("missing required field: {}", required[0]))
                }
                _ => Ok(()),
            };
        }
        _ => return Err("arguments must be an object".to_string()),
    };
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required {
            let name = field.as_str().unwrap_or_default();
            match obj.get(name) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required field: {}", name));
                }
                _ => {}
            }
        }
    }
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, descriptor) in props {
            let Some(value) = obj.get(name) else { continue };
            if value.is_null() {
                continue;
            }
            let Some(expected) = descriptor.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!(
                    "field {} must be of type {}",
                    name, expected
                ));
            }
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        object_schema(
            &[
                SchemaField::new("label", "string", "Entity label"),
                SchemaField::new("limit", "integer", "Max results"),
                SchemaField::new("properties", "object", "Property map"),
            ],
            &["label"],
        )
    }

    /// **Scenario**: valid arguments pass; missing required fields fail.
    #[test]
    fn required_fields() {
        let s = schema();
        assert!(validate_args(&s, &json!({"label": "Person"})).is_ok());
        let err = validate_args(&s, &json!({"limit": 5})).unwrap_err();
        assert!(err.contains("label"), "{}", err);
        let err = validate_args(&s, &json!(null)).unwrap_err();
        assert!(err.contains("label"), "{}", err);
    }

    /// **Scenario**: type mismatches are rejected with the field name.
    #[test]
    fn type_checks() {
        let s = schema();
        let err = validate_args(&s, &json!({"label": 42})).unwrap_err();
        assert!(err.contains("label"), "{}", err);
        let err =
            validate_args(&s, &json!({"label": "x", "limit": "ten"})).unwrap_err();
        assert!(err.contains("limit"), "{}", err);
        assert!(
            validate_args(&s, &json!({"label": "x", "properties": {"a": 1}})).is_ok()
        );
    }

    /// **Scenario**: explicit null counts as missing for required fields and
    /// as absent for optional ones.
    #[test]
    fn null_handling() {
        let s = schema();
        assert!(validate_args(&s, &json!({"label": null})).is_err());
        assert!(validate_args(&s, &json!({"label": "x", "limit": null})).is_ok());
    }

    /// **Scenario**: non-object arguments are rejected outright.
    #[test]
    fn non_object_args() {
        let s = schema();
        assert!(validate_args(&s, &json!([1, 2])).is_err());
        assert!(validate_args(&s, &json!("str")).is_err());
    }
}
