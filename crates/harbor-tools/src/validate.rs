//! Input validation against a [`SchemaNode`].
//!
//! Validation collects every issue rather than stopping at the first, and
//! returns the input with defaults filled in. Unknown object keys pass
//! through untouched.

use std::fmt;

use serde_json::{Map, Value};

use crate::schema::{SchemaKind, SchemaNode, value_type_name};

/// One validation failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path to the offending field (`items.0.name`); empty at the root.
    pub path: String,
    /// What was wrong.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// All issues found in one input, in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationIssue>);

impl ValidationErrors {
    /// Issues found.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate `value` against `schema`.
///
/// Returns the value with defaults applied for omitted fields.
pub fn validate(schema: &dyn SchemaNode, value: &Value) -> Result<Value, ValidationErrors> {
    let mut issues = Vec::new();
    let out = check(schema, Some(value), "", &mut issues);
    match out {
        Some(v) if issues.is_empty() => Ok(v),
        _ => Err(ValidationErrors(issues)),
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn push(issues: &mut Vec<ValidationIssue>, path: &str, message: impl Into<String>) {
    issues.push(ValidationIssue {
        path: path.to_string(),
        message: message.into(),
    });
}

fn expected(issues: &mut Vec<ValidationIssue>, path: &str, want: &str, got: &Value) -> Option<Value> {
    push(
        issues,
        path,
        format!("Expected {want}, received {}", value_type_name(got)),
    );
    None
}

/// Check one node. `None` input means the field was omitted. Returns the
/// output value, or `None` when the field stays omitted or failed.
fn check(
    node: &dyn SchemaNode,
    value: Option<&Value>,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Value> {
    let Some(value) = value else {
        if let Some(default) = node.default_value() {
            return Some(default);
        }
        if !node.is_optional() {
            push(issues, path, "Required");
        }
        return None;
    };

    let kind = node.kind();
    if value.is_null() && (node.is_nullable() || matches!(kind, SchemaKind::Any)) {
        return Some(Value::Null);
    }

    match kind {
        SchemaKind::Any => Some(value.clone()),
        SchemaKind::String => match value {
            Value::String(_) => Some(value.clone()),
            other => expected(issues, path, "string", other),
        },
        SchemaKind::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            other => expected(issues, path, "boolean", other),
        },
        SchemaKind::Number { integer } => match value {
            Value::Number(n) if integer && !(n.is_i64() || n.is_u64()) => {
                push(issues, path, "Expected integer, received float");
                None
            }
            Value::Number(_) => Some(value.clone()),
            other => expected(issues, path, "number", other),
        },
        SchemaKind::Enum(options) => match value {
            Value::String(s) if options.contains(s) => Some(value.clone()),
            Value::String(s) => {
                let allowed = options
                    .iter()
                    .map(|o| format!("'{o}'"))
                    .collect::<Vec<_>>()
                    .join(" | ");
                push(
                    issues,
                    path,
                    format!("Invalid enum value. Expected {allowed}, received '{s}'"),
                );
                None
            }
            other => expected(issues, path, "string", other),
        },
        SchemaKind::Literal(lit) => {
            if *value == lit {
                Some(value.clone())
            } else {
                push(issues, path, format!("Invalid literal value, expected {lit}"));
                None
            }
        }
        SchemaKind::Array(items) => {
            let Value::Array(elements) = value else {
                return expected(issues, path, "array", value);
            };
            let before = issues.len();
            let out: Vec<Value> = elements
                .iter()
                .enumerate()
                .filter_map(|(i, el)| check(items.as_ref(), Some(el), &join(path, &i.to_string()), issues))
                .collect();
            (issues.len() == before).then_some(Value::Array(out))
        }
        SchemaKind::Object(props) => {
            let Value::Object(input) = value else {
                return expected(issues, path, "object", value);
            };
            let before = issues.len();
            let mut out = Map::new();
            for (name, child) in &props {
                if let Some(v) = check(child.as_ref(), input.get(name), &join(path, name), issues) {
                    let _ = out.insert(name.clone(), v);
                }
            }
            for (key, v) in input {
                if !props.iter().any(|(name, _)| name == key) {
                    let _ = out.insert(key.clone(), v.clone());
                }
            }
            (issues.len() == before).then_some(Value::Object(out))
        }
        SchemaKind::Record(values) => {
            let Value::Object(input) = value else {
                return expected(issues, path, "object", value);
            };
            let before = issues.len();
            let mut out = Map::new();
            for (key, v) in input {
                if let Some(checked) = check(values.as_ref(), Some(v), &join(path, key), issues) {
                    let _ = out.insert(key.clone(), checked);
                }
            }
            (issues.len() == before).then_some(Value::Object(out))
        }
        SchemaKind::Union(options) => {
            for option in &options {
                let mut scratch = Vec::new();
                if let Some(v) = check(option.as_ref(), Some(value), path, &mut scratch) {
                    if scratch.is_empty() {
                        return Some(v);
                    }
                }
            }
            push(issues, path, "Invalid input");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
