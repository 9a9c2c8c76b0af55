//! Declared output shapes, enforced with `jsonschema`.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::node::SchemaNode;
use crate::types::{Error, Result};

/// An output schema compiled once at registration.
#[derive(Clone)]
pub struct OutputContract {
    schema: SchemaNode,
    validator: Arc<jsonschema::Validator>,
}

impl OutputContract {
    pub fn compile(schema: SchemaNode) -> Result<Self> {
        schema.check_definition("output schema")?;
        let document = schema.to_json_schema();
        let validator = jsonschema::validator_for(&document)
            .map_err(|e| Error::validation(format!("output schema does not compile: {}", e)))?;
        Ok(Self {
            schema,
            validator: Arc::new(validator),
        })
    }

    pub fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    /// Check a produced value. Returns every mismatch message on failure.
    pub fn check(&self, value: &Value) -> std::result::Result<(), Vec<String>> {
        let problems: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|e| e.to_string())
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

impl fmt::Debug for OutputContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputContract")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl PartialEq for OutputContract {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
    }
}
