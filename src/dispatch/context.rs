//! Per-invocation execution context.

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::client::{RemoteError, ToolkitClient};
use crate::credentials::Credential;
use crate::tools::HttpMethod;
use crate::types::{CallerId, InvocationId, ToolId};

/// Everything a handler may need about the call it is serving.
///
/// Cheap to clone and never persisted. The credential is present only for
/// tools that belong to a toolkit requiring one.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    invocation_id: InvocationId,
    tool_id: ToolId,
    caller: CallerId,
    raw_input: Arc<Value>,
    credential: Option<Credential>,
    cancel: CancellationToken,
    toolkit: Option<ToolkitClient>,
}

impl ExecutionContext {
    /// Context with a fresh invocation id and no toolkit. Useful for driving
    /// handlers directly.
    pub fn new(tool_id: ToolId, caller: CallerId, raw_input: Value) -> Self {
        Self {
            invocation_id: InvocationId::new(),
            tool_id,
            caller,
            raw_input: Arc::new(raw_input),
            credential: None,
            cancel: CancellationToken::new(),
            toolkit: None,
        }
    }

    pub(crate) fn with_invocation_id(mut self, id: InvocationId) -> Self {
        self.invocation_id = id;
        self
    }

    pub(crate) fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub(crate) fn with_toolkit(mut self, toolkit: Option<ToolkitClient>) -> Self {
        self.toolkit = toolkit;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn invocation_id(&self) -> &InvocationId {
        &self.invocation_id
    }

    pub fn tool_id(&self) -> &ToolId {
        &self.tool_id
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Input exactly as the caller sent it, before defaults were filled.
    pub fn raw_input(&self) -> &Value {
        &self.raw_input
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn toolkit(&self) -> Option<&ToolkitClient> {
        self.toolkit.as_ref()
    }

    /// Authenticated call against the owning toolkit's API.
    pub async fn execute_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RemoteError> {
        match &self.toolkit {
            Some(client) => client.execute_request(method, path, body).await,
            None => Err(RemoteError::Request(format!(
                "tool '{}' has no registered toolkit to call",
                self.tool_id
            ))),
        }
    }
}
