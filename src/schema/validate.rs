//! Structural input validation.
//!
//! Validation is pure and recursive. Every violation is collected with its
//! path (`$.items[2].name`) instead of stopping at the first one. Undeclared
//! object keys pass through untouched unless the node sets `deny_unknown`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::node::{SchemaKind, SchemaNode};

/// One violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Input did not match its schema. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.path, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Input that passed validation, with declared defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput(Value);

impl ValidatedInput {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Top-level object fields, if the input is an object.
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

/// Validate `input` against `schema`.
pub fn validate(schema: &SchemaNode, input: &Value) -> Result<ValidatedInput, ValidationError> {
    validate_value(schema, input)?;
    let mut value = input.clone();
    fill_defaults(schema, &mut value);
    Ok(ValidatedInput(value))
}

/// Validate without building a [`ValidatedInput`].
pub(crate) fn validate_value(schema: &SchemaNode, input: &Value) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    if !(input.is_null() && !schema.is_required()) {
        walk(schema, input, "$", &mut violations);
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn walk(node: &SchemaNode, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match &node.kind {
        SchemaKind::Integer => {
            if !(value.is_i64() || value.is_u64()) {
                out.push(mismatch(path, "integer", value));
            }
        }
        SchemaKind::Number => {
            if !value.is_number() {
                out.push(mismatch(path, "number", value));
            }
        }
        SchemaKind::Boolean => {
            if !value.is_boolean() {
                out.push(mismatch(path, "boolean", value));
            }
        }
        SchemaKind::String { enum_values } => match value.as_str() {
            None => out.push(mismatch(path, "string", value)),
            Some(s) if !enum_values.is_empty() && !enum_values.iter().any(|v| v == s) => {
                out.push(Violation::new(
                    path,
                    format!(
                        "invalid enum value '{}', expected one of: {}",
                        s,
                        enum_values.join(", ")
                    ),
                ));
            }
            Some(_) => {}
        },
        SchemaKind::Array { items } => match value.as_array() {
            None => out.push(mismatch(path, "array", value)),
            Some(elements) => {
                for (i, element) in elements.iter().enumerate() {
                    let element_path = format!("{}[{}]", path, i);
                    if element.is_null() && !items.is_required() {
                        continue;
                    }
                    walk(items, element, &element_path, out);
                }
            }
        },
        SchemaKind::Object {
            fields,
            deny_unknown,
        } => {
            let Some(map) = value.as_object() else {
                out.push(mismatch(path, "object", value));
                return;
            };

            for field in fields {
                let field_path = format!("{}.{}", path, field.name);
                match map.get(&field.name) {
                    None | Some(Value::Null) if !field.schema.is_required() => {}
                    None => out.push(Violation::new(&field_path, "missing required field")),
                    Some(v) => walk(&field.schema, v, &field_path, out),
                }
            }

            if *deny_unknown {
                for key in map.keys() {
                    if !fields.iter().any(|f| &f.name == key) {
                        out.push(Violation::new(&format!("{}.{}", path, key), "unknown field"));
                    }
                }
            }
        }
    }
}

fn mismatch(path: &str, expected: &str, got: &Value) -> Violation {
    Violation::new(
        path,
        format!("expected {}, got {}", expected, value_type_name(got)),
    )
}

fn fill_defaults(node: &SchemaNode, value: &mut Value) {
    match (&node.kind, value) {
        (SchemaKind::Object { fields, .. }, Value::Object(map)) => {
            for field in fields {
                if matches!(map.get(&field.name), None | Some(Value::Null)) {
                    if let Some(default) = &field.schema.default {
                        map.insert(field.name.clone(), default.clone());
                    }
                } else if let Some(existing) = map.get_mut(&field.name) {
                    fill_defaults(&field.schema, existing);
                }
            }
        }
        (SchemaKind::Array { items }, Value::Array(elements)) => {
            for element in elements {
                fill_defaults(items, element);
            }
        }
        _ => {}
    }
}

pub(crate) fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
