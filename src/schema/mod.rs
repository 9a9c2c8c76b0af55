//! Schema model — describes tool inputs and outputs and validates against them.

mod node;
mod output;
mod validate;

pub use node::{FieldSchema, ObjectSchema, SchemaKind, SchemaNode, MAX_SCHEMA_DEPTH};
pub use output::OutputContract;
pub use validate::{validate, ValidatedInput, ValidationError, Violation};

pub(crate) use validate::value_type_name;
