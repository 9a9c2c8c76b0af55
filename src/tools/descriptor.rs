//! Tool descriptors: the unit of registration.
//!
//! A descriptor is built once, checked, and then shared immutably as
//! `Arc<ToolDescriptor>`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use super::endpoint::{EndpointTemplate, ResponseMapping};
use crate::dispatch::ExecutionContext;
use crate::envelope::ErrorKind;
use crate::schema::{OutputContract, SchemaKind, SchemaNode, ValidatedInput};
use crate::types::{Error, Result, ToolId, ToolkitId};
use crate::validation::validate_non_empty;

// =============================================================================
// Local handlers
// =============================================================================

/// Failure raised by a local handler.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    kind: Option<ErrorKind>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Report the failure under another envelope kind, e.g. a timeout hit by
    /// a toolkit call made from inside the handler.
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Envelope kind; `Handler` unless overridden.
    pub fn kind(&self) -> ErrorKind {
        self.kind.unwrap_or(ErrorKind::Handler)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("serialization error: {}", err))
    }
}

/// Code behind a local tool.
///
/// Handlers get the validated input and the per-call context explicitly;
/// credentials and the toolkit request capability live on the context.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        input: ValidatedInput,
        ctx: ExecutionContext,
    ) -> std::result::Result<Value, HandlerError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ValidatedInput, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, HandlerError>> + Send,
{
    async fn call(
        &self,
        input: ValidatedInput,
        ctx: ExecutionContext,
    ) -> std::result::Result<Value, HandlerError> {
        (self)(input, ctx).await
    }
}

// =============================================================================
// Execution kind
// =============================================================================

/// Remote-proxy target: an endpoint on the owning toolkit's API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub template: EndpointTemplate,
    pub response: Option<ResponseMapping>,
}

/// How a tool runs.
#[derive(Clone)]
pub enum Execution {
    Local(Arc<dyn ToolHandler>),
    RemoteProxy(RemoteEndpoint),
}

impl Execution {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Execution::Local(_) => "local",
            Execution::RemoteProxy(_) => "remote_proxy",
        }
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Local(_) => f.write_str("Local(<handler>)"),
            Execution::RemoteProxy(endpoint) => f.debug_tuple("RemoteProxy").field(endpoint).finish(),
        }
    }
}

impl PartialEq for Execution {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Execution::Local(a), Execution::Local(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Execution::RemoteProxy(a), Execution::RemoteProxy(b)) => a == b,
            _ => false,
        }
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Immutable registered definition of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    id: ToolId,
    toolkit_id: Option<ToolkitId>,
    description: String,
    input_schema: SchemaNode,
    output: Option<OutputContract>,
    tags: Vec<String>,
    execution: Execution,
}

impl ToolDescriptor {
    /// Start a local tool backed by `handler`.
    pub fn local<H>(
        id: &str,
        description: &str,
        input_schema: impl Into<SchemaNode>,
        handler: H,
    ) -> DescriptorBuilder
    where
        H: ToolHandler + 'static,
    {
        DescriptorBuilder::new(
            id,
            description,
            input_schema.into(),
            PendingExecution::Local(Arc::new(handler)),
        )
    }

    /// Start a remote-proxy tool on `toolkit`.
    pub fn remote(
        id: &str,
        toolkit: &str,
        description: &str,
        input_schema: impl Into<SchemaNode>,
        template: EndpointTemplate,
    ) -> DescriptorBuilder {
        DescriptorBuilder::new(
            id,
            description,
            input_schema.into(),
            PendingExecution::Remote(template),
        )
        .toolkit(toolkit)
    }

    pub fn id(&self) -> &ToolId {
        &self.id
    }

    pub fn toolkit_id(&self) -> Option<&ToolkitId> {
        self.toolkit_id.as_ref()
    }

    /// Toolkit id, or `"none"` for standalone tools.
    pub fn toolkit_name(&self) -> &str {
        self.toolkit_id.as_ref().map_or("none", ToolkitId::as_str)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &SchemaNode {
        &self.input_schema
    }

    pub fn output(&self) -> Option<&OutputContract> {
        self.output.as_ref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    /// Function-calling declaration for LLM runtimes.
    pub fn declaration(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.id.as_str(),
                "description": self.description,
                "parameters": self.input_schema.to_json_schema(),
            }
        })
    }

    /// Prompt line: `- tool_id(param1: type, param2?: type): description`.
    pub fn to_prompt_line(&self) -> String {
        let params: Vec<String> = self
            .input_schema
            .fields()
            .iter()
            .map(|f| {
                let optional = if f.schema.is_required() { "" } else { "?" };
                format!("{}{}: {}", f.name, optional, f.schema.display_name())
            })
            .collect();

        format!("- {}({}): {}", self.id, params.join(", "), self.description)
    }
}

// =============================================================================
// Builder
// =============================================================================

enum PendingExecution {
    Local(Arc<dyn ToolHandler>),
    Remote(EndpointTemplate),
}

/// Collects descriptor parts; all checks happen in [`DescriptorBuilder::build`].
#[must_use]
pub struct DescriptorBuilder {
    id: String,
    toolkit: Option<String>,
    description: String,
    input_schema: SchemaNode,
    output_schema: Option<SchemaNode>,
    tags: Vec<String>,
    execution: PendingExecution,
    response: Option<ResponseMapping>,
}

impl fmt::Debug for DescriptorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorBuilder")
            .field("id", &self.id)
            .field("toolkit", &self.toolkit)
            .finish_non_exhaustive()
    }
}

impl DescriptorBuilder {
    fn new(id: &str, description: &str, input_schema: SchemaNode, execution: PendingExecution) -> Self {
        Self {
            id: id.to_string(),
            toolkit: None,
            description: description.to_string(),
            input_schema,
            output_schema: None,
            tags: Vec::new(),
            execution,
            response: None,
        }
    }

    /// Owning toolkit. Local tools with a toolkit get its credential.
    pub fn toolkit(mut self, toolkit: &str) -> Self {
        self.toolkit = Some(toolkit.to_string());
        self
    }

    pub fn output_schema(mut self, schema: impl Into<SchemaNode>) -> Self {
        self.output_schema = Some(schema.into());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Reshape remote responses before the output check.
    pub fn response_mapping(mut self, mapping: ResponseMapping) -> Self {
        self.response = Some(mapping);
        self
    }

    pub fn build(self) -> Result<ToolDescriptor> {
        let id = ToolId::from_string(self.id).map_err(Error::validation)?;
        let toolkit_id = self
            .toolkit
            .map(|t| ToolkitId::from_string(t).map_err(Error::validation))
            .transpose()?;
        validate_non_empty(&self.description, "description")?;
        for tag in &self.tags {
            validate_non_empty(tag, "tag")?;
        }

        if !self.input_schema.is_object() {
            return Err(Error::validation(format!(
                "tool '{}': input schema must be an object",
                id
            )));
        }
        self.input_schema.check_definition("input schema")?;
        let output = self.output_schema.map(OutputContract::compile).transpose()?;

        let execution = match self.execution {
            PendingExecution::Local(handler) => {
                if self.response.is_some() {
                    return Err(Error::validation(format!(
                        "tool '{}': response mappings apply to remote tools only",
                        id
                    )));
                }
                Execution::Local(handler)
            }
            PendingExecution::Remote(template) => {
                if toolkit_id.is_none() {
                    return Err(Error::validation(format!(
                        "tool '{}': remote tools need a toolkit",
                        id
                    )));
                }
                check_placeholders(&id, &template, &self.input_schema)?;
                if let Some(mapping) = &self.response {
                    mapping.check()?;
                }
                Execution::RemoteProxy(RemoteEndpoint {
                    template,
                    response: self.response,
                })
            }
        };

        Ok(ToolDescriptor {
            id,
            toolkit_id,
            description: self.description,
            input_schema: self.input_schema,
            output,
            tags: self.tags,
            execution,
        })
    }
}

/// Every placeholder must be a required scalar top-level input field.
fn check_placeholders(id: &ToolId, template: &EndpointTemplate, schema: &SchemaNode) -> Result<()> {
    for name in template.placeholders() {
        let field = schema.field(name).ok_or_else(|| {
            Error::validation(format!(
                "tool '{}': path placeholder '{{{}}}' is not an input field",
                id, name
            ))
        })?;
        if !field.is_required() {
            return Err(Error::validation(format!(
                "tool '{}': path placeholder '{{{}}}' must be a required field",
                id, name
            )));
        }
        if matches!(field.kind, SchemaKind::Array { .. } | SchemaKind::Object { .. }) {
            return Err(Error::validation(format!(
                "tool '{}': path placeholder '{{{}}}' must be a scalar field",
                id, name
            )));
        }
    }
    Ok(())
}
