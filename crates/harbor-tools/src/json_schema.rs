//! JSON-Schema projection of any [`SchemaNode`].
//!
//! Used to advertise tool inputs over tool discovery. Descriptions and
//! defaults are kept; an object's `required` list holds every property that
//! is neither optional nor nullable.

use serde_json::{Map, Value, json};

use crate::schema::{SchemaKind, SchemaNode};

/// Render `node` as a JSON-Schema value.
pub fn to_json_schema(node: &dyn SchemaNode) -> Value {
    let mut schema = match node.kind() {
        SchemaKind::String => json!({"type": "string"}),
        SchemaKind::Number { integer: false } => json!({"type": "number"}),
        SchemaKind::Number { integer: true } => json!({"type": "integer"}),
        SchemaKind::Boolean => json!({"type": "boolean"}),
        SchemaKind::Array(items) => json!({"type": "array", "items": to_json_schema(items.as_ref())}),
        SchemaKind::Object(props) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for (name, child) in &props {
                if !child.is_optional() && !child.is_nullable() {
                    required.push(Value::String(name.clone()));
                }
                let _ = properties.insert(name.clone(), to_json_schema(child.as_ref()));
            }
            let mut obj = json!({"type": "object", "properties": properties});
            if !required.is_empty() {
                obj["required"] = Value::Array(required);
            }
            obj
        }
        SchemaKind::Enum(values) => json!({"type": "string", "enum": values}),
        SchemaKind::Literal(value) => literal_schema(value),
        SchemaKind::Union(options) => {
            let any_of: Vec<Value> = options.iter().map(|o| to_json_schema(o.as_ref())).collect();
            json!({"anyOf": any_of})
        }
        SchemaKind::Record(values) => {
            json!({"type": "object", "additionalProperties": to_json_schema(values.as_ref())})
        }
        SchemaKind::Any => json!({}),
    };

    if node.is_nullable() {
        schema = make_nullable(schema);
    }
    if let Value::Object(obj) = &mut schema {
        if let Some(description) = node.description() {
            let _ = obj.insert("description".into(), Value::String(description));
        }
        if let Some(default) = node.default_value() {
            let _ = obj.insert("default".into(), default);
        }
    }
    schema
}

fn literal_schema(value: Value) -> Value {
    let ty = match &value {
        Value::String(_) => Some("string"),
        Value::Number(n) if n.is_f64() => Some("number"),
        Value::Number(_) => Some("integer"),
        Value::Bool(_) => Some("boolean"),
        Value::Null => Some("null"),
        Value::Array(_) | Value::Object(_) => None,
    };
    match ty {
        Some(ty) => json!({"type": ty, "const": value}),
        None => json!({"const": value}),
    }
}

fn make_nullable(schema: Value) -> Value {
    match schema.get("type").and_then(Value::as_str) {
        Some("null") => schema,
        Some(ty) => {
            let ty = ty.to_string();
            let mut schema = schema;
            schema["type"] = json!([ty, "null"]);
            schema
        }
        None if schema.as_object().is_some_and(Map::is_empty) => schema,
        None => json!({"anyOf": [schema, {"type": "null"}]}),
    }
}
