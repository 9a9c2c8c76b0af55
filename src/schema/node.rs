//! Schema nodes: semantic type descriptors for tool inputs and outputs.
//!
//! Schemas are declared explicitly through the builder functions below rather
//! than inferred from function signatures. Nodes own their children by value,
//! so a schema graph is always acyclic; depth is bounded by [`MAX_SCHEMA_DEPTH`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::types::{Error, Result};
use crate::validation::validate_depth;

/// Deepest nesting accepted at registration.
pub const MAX_SCHEMA_DEPTH: usize = 32;

// =============================================================================
// Node types
// =============================================================================

/// Kind of value a node describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaKind {
    Integer,
    Number,
    Boolean,
    String {
        /// Allowed values; empty means any string.
        #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
        enum_values: Vec<String>,
    },
    Array {
        items: Box<SchemaNode>,
    },
    Object {
        #[serde(default)]
        fields: Vec<FieldSchema>,
        /// Reject keys that are not declared in `fields`.
        #[serde(default, skip_serializing_if = "is_false")]
        deny_unknown: bool,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A typed value descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaNode {
    #[serde(flatten)]
    pub kind: SchemaKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Absent or `null` values are accepted.
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,

    /// Filled into validated input when the field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A named field of an object node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSchema {
    pub name: String,
    #[serde(flatten)]
    pub schema: SchemaNode,
}

impl SchemaNode {
    fn of(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
            optional: false,
            default: None,
        }
    }

    pub fn integer() -> Self {
        Self::of(SchemaKind::Integer)
    }

    pub fn number() -> Self {
        Self::of(SchemaKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaKind::Boolean)
    }

    pub fn string() -> Self {
        Self::of(SchemaKind::String {
            enum_values: Vec::new(),
        })
    }

    /// String restricted to the given values.
    pub fn string_enum<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(SchemaKind::String {
            enum_values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn array(items: impl Into<SchemaNode>) -> Self {
        Self::of(SchemaKind::Array {
            items: Box::new(items.into()),
        })
    }

    /// Start an object schema.
    pub fn object() -> ObjectSchema {
        ObjectSchema::default()
    }

    /// Attach a human-readable description.
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Mark the node optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Default used when the field is absent. Implies optional.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self.optional = true;
        self
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, SchemaKind::Object { .. })
    }

    /// A field is required when it is neither optional nor defaulted.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    /// Declared fields of an object node (empty for other kinds).
    pub fn fields(&self) -> &[FieldSchema] {
        match &self.kind {
            SchemaKind::Object { fields, .. } => fields,
            _ => &[],
        }
    }

    /// Look up a declared field of an object node.
    pub fn field(&self, name: &str) -> Option<&SchemaNode> {
        self.fields()
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.schema)
    }

    /// Nesting depth; a primitive is depth 1.
    pub fn depth(&self) -> usize {
        match &self.kind {
            SchemaKind::Array { items } => 1 + items.depth(),
            SchemaKind::Object { fields, .. } => {
                1 + fields.iter().map(|f| f.schema.depth()).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Check the schema itself is well formed.
    ///
    /// Rejects empty or duplicate field names, empty enums, defaults that do
    /// not conform to their node, and nesting beyond [`MAX_SCHEMA_DEPTH`].
    pub fn check_definition(&self, what: &str) -> Result<()> {
        validate_depth(self.depth(), MAX_SCHEMA_DEPTH, what)?;
        self.check_node(what)
    }

    fn check_node(&self, path: &str) -> Result<()> {
        if let Some(default) = &self.default {
            let mut probe = self.clone();
            probe.default = None;
            probe.optional = false;
            if let Err(e) = super::validate::validate_value(&probe, default) {
                return Err(Error::validation(format!(
                    "default for {} does not match its schema: {}",
                    path, e
                )));
            }
        }

        match &self.kind {
            SchemaKind::String { enum_values } => {
                if enum_values.iter().any(|v| v.is_empty()) {
                    return Err(Error::validation(format!(
                        "{} declares an empty enum value",
                        path
                    )));
                }
                Ok(())
            }
            SchemaKind::Array { items } => items.check_node(&format!("{}[]", path)),
            SchemaKind::Object { fields, .. } => {
                let mut seen = HashSet::new();
                for field in fields {
                    if field.name.is_empty() {
                        return Err(Error::validation(format!(
                            "{} declares a field with an empty name",
                            path
                        )));
                    }
                    if !seen.insert(field.name.as_str()) {
                        return Err(Error::validation(format!(
                            "{} declares field '{}' twice",
                            path, field.name
                        )));
                    }
                    field.schema.check_node(&format!("{}.{}", path, field.name))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Short type label used in prompt lines, e.g. `string[]` or `enum(asc|desc)`.
    pub fn display_name(&self) -> String {
        match &self.kind {
            SchemaKind::Integer => "integer".to_string(),
            SchemaKind::Number => "number".to_string(),
            SchemaKind::Boolean => "boolean".to_string(),
            SchemaKind::String { enum_values } if enum_values.is_empty() => "string".to_string(),
            SchemaKind::String { enum_values } => format!("enum({})", enum_values.join("|")),
            SchemaKind::Array { items } => format!("{}[]", items.display_name()),
            SchemaKind::Object { .. } => "object".to_string(),
        }
    }

    /// Render as a JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        let mut out = Map::new();
        let type_name = match &self.kind {
            SchemaKind::Integer => "integer",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::String { .. } => "string",
            SchemaKind::Array { .. } => "array",
            SchemaKind::Object { .. } => "object",
        };
        if self.optional {
            out.insert("type".into(), json!([type_name, "null"]));
        } else {
            out.insert("type".into(), json!(type_name));
        }
        if let Some(desc) = &self.description {
            out.insert("description".into(), json!(desc));
        }
        if let Some(default) = &self.default {
            out.insert("default".into(), default.clone());
        }

        match &self.kind {
            SchemaKind::String { enum_values } if !enum_values.is_empty() => {
                out.insert("enum".into(), json!(enum_values));
            }
            SchemaKind::Array { items } => {
                out.insert("items".into(), items.to_json_schema());
            }
            SchemaKind::Object {
                fields,
                deny_unknown,
            } => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.name.clone(), f.schema.to_json_schema()))
                    .collect();
                let required: Vec<&str> = fields
                    .iter()
                    .filter(|f| f.schema.is_required())
                    .map(|f| f.name.as_str())
                    .collect();
                out.insert("properties".into(), Value::Object(properties));
                out.insert("required".into(), json!(required));
                out.insert("additionalProperties".into(), json!(!deny_unknown));
            }
            _ => {}
        }
        Value::Object(out)
    }
}

// =============================================================================
// Object builder
// =============================================================================

/// Builder for object nodes.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<FieldSchema>,
    deny_unknown: bool,
    description: Option<String>,
    optional: bool,
}

impl ObjectSchema {
    /// Declare a field. Declaration order is kept for rendering.
    pub fn field(mut self, name: impl Into<String>, schema: impl Into<SchemaNode>) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            schema: schema.into(),
        });
        self
    }

    /// Reject undeclared keys instead of passing them through.
    pub fn deny_unknown(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn build(self) -> SchemaNode {
        SchemaNode {
            kind: SchemaKind::Object {
                fields: self.fields,
                deny_unknown: self.deny_unknown,
            },
            description: self.description,
            optional: self.optional,
            default: None,
        }
    }
}

impl From<ObjectSchema> for SchemaNode {
    fn from(builder: ObjectSchema) -> Self {
        builder.build()
    }
}
