//! The execution dispatcher.
//!
//! `lookup → validate → {local handler | remote proxy} → normalize`. Every
//! outcome, including panics, timeouts, and cancellation, comes back as a
//! [`ResultEnvelope`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::client::{OutboundRequest, RemoteError, ToolkitClient};
use super::context::ExecutionContext;
use super::error::DispatchError;
use super::state::InvocationState;
use crate::credentials::{CachingResolver, Credential, CredentialError, CredentialResolver};
use crate::envelope::ResultEnvelope;
use crate::schema::{self, ValidatedInput};
use crate::tools::{Execution, RemoteEndpoint, ToolDescriptor, ToolHandler, ToolRegistry, Toolkit};
use crate::types::{CallerId, Config, DispatchConfig, Error, InvocationId, Result};

/// One call to make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Unvalidated on purpose: unknown ids come back as `NOT_FOUND`.
    pub tool_id: String,
    pub input: Value,
    pub caller: CallerId,
}

impl InvocationRequest {
    pub fn new(tool_id: impl Into<String>, input: Value, caller: CallerId) -> Self {
        Self {
            tool_id: tool_id.into(),
            input,
            caller,
        }
    }
}

/// Validates, routes, and executes tool calls. Share it behind an `Arc`.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    resolver: Arc<dyn CredentialResolver>,
    http: reqwest::Client,
    config: DispatchConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        resolver: Arc<dyn CredentialResolver>,
        config: DispatchConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            registry,
            resolver,
            http,
            config,
        })
    }

    /// Build from a full [`Config`], wrapping `resolver` in the credential
    /// cache when it is enabled.
    pub fn from_config<R>(registry: Arc<ToolRegistry>, resolver: R, config: &Config) -> Result<Self>
    where
        R: CredentialResolver + 'static,
    {
        config.validate()?;
        let resolver: Arc<dyn CredentialResolver> = if config.credentials.enabled {
            Arc::new(CachingResolver::from_config(resolver, &config.credentials))
        } else {
            Arc::new(resolver)
        };
        Self::new(registry, resolver, config.dispatch.clone())
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Run one invocation to completion. Never panics, never errors.
    pub async fn invoke(&self, request: InvocationRequest, cancel: CancellationToken) -> ResultEnvelope {
        let invocation_id = InvocationId::new();
        let span = tracing::info_span!(
            "invoke",
            tool = %request.tool_id,
            invocation = %invocation_id,
            caller = %request.caller,
        );

        async move {
            let started = Instant::now();
            let mut state = InvocationState::Pending;
            let outcome = self.run(invocation_id, request, cancel, &mut state).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(data) => {
                    state.advance(InvocationState::Succeeded);
                    tracing::info!(elapsed_ms, "invocation succeeded");
                    ResultEnvelope::success(data)
                }
                Err(err) => {
                    if !state.is_terminal() {
                        state.advance(InvocationState::Failed);
                    }
                    let kind = err.kind();
                    if kind.is_recoverable() {
                        tracing::info!(%kind, elapsed_ms, error = %err, "invocation failed");
                    } else {
                        tracing::warn!(%kind, elapsed_ms, error = %err, "invocation failed");
                    }
                    err.into_envelope(self.config.max_error_message_len)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run many invocations concurrently; envelopes come back in request
    /// order.
    pub async fn invoke_batch(
        &self,
        requests: Vec<InvocationRequest>,
        cancel: &CancellationToken,
    ) -> Vec<ResultEnvelope> {
        let calls = requests
            .into_iter()
            .map(|request| self.invoke(request, cancel.clone()));
        futures::future::join_all(calls).await
    }

    async fn run(
        &self,
        invocation_id: InvocationId,
        request: InvocationRequest,
        cancel: CancellationToken,
        state: &mut InvocationState,
    ) -> std::result::Result<Value, DispatchError> {
        let InvocationRequest {
            tool_id,
            input: raw_input,
            caller,
        } = request;

        let tool = self
            .registry
            .lookup(&tool_id)
            .map_err(|_| DispatchError::NotFound(tool_id.clone()))?;

        state.advance(InvocationState::Validating);
        let input = match schema::validate(tool.input_schema(), &raw_input) {
            Ok(input) => input,
            Err(err) => {
                state.advance(InvocationState::ValidationFailed);
                return Err(err.into());
            }
        };

        state.advance(InvocationState::Dispatching);
        let toolkit = tool
            .toolkit_id()
            .and_then(|id| self.registry.toolkit(id.as_str()));
        if matches!(tool.execution(), Execution::RemoteProxy(_)) && toolkit.is_none() {
            return Err(DispatchError::ToolkitMissing(tool.toolkit_name().to_string()));
        }

        let credential = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            resolved = self.credential_for(&tool, toolkit.as_deref(), &caller) => resolved?,
        };
        let client = toolkit.map(|toolkit| {
            ToolkitClient::new(
                self.http.clone(),
                toolkit,
                credential.clone(),
                self.config.remote_timeout,
                cancel.clone(),
            )
        });

        state.advance(InvocationState::Executing);
        tracing::debug!(kind = tool.execution().kind_name(), "executing");
        let outcome = match tool.execution() {
            Execution::Local(handler) => {
                let ctx = ExecutionContext::new(tool.id().clone(), caller, raw_input)
                    .with_invocation_id(invocation_id)
                    .with_credential(credential)
                    .with_toolkit(client)
                    .with_cancellation(cancel.clone());
                self.run_local(handler.clone(), input, ctx, &cancel).await
            }
            Execution::RemoteProxy(endpoint) => match client {
                Some(client) => {
                    let result = self.run_remote(endpoint, input, &client).await;
                    if let (Err(DispatchError::Remote(RemoteError::Status { status: 401, .. })), Some(toolkit_id)) =
                        (&result, tool.toolkit_id())
                    {
                        tracing::info!(toolkit = %toolkit_id, "credential rejected; invalidating");
                        self.resolver.invalidate(toolkit_id, &caller);
                    }
                    result
                }
                None => Err(DispatchError::ToolkitMissing(tool.toolkit_name().to_string())),
            },
        }?;

        check_output(&tool, outcome)
    }

    /// Credential for tools in a toolkit that needs one; `None` otherwise.
    async fn credential_for(
        &self,
        tool: &ToolDescriptor,
        toolkit: Option<&Toolkit>,
        caller: &CallerId,
    ) -> std::result::Result<Option<Credential>, DispatchError> {
        let Some(toolkit_id) = tool.toolkit_id() else {
            return Ok(None);
        };
        if toolkit.is_some_and(|t| !t.auth().requires_credential()) {
            return Ok(None);
        }

        let credential = self.resolver.resolve(toolkit_id, caller).await?;
        if credential.is_expired() {
            return Err(CredentialError::Expired {
                toolkit: toolkit_id.clone(),
            }
            .into());
        }
        Ok(Some(credential))
    }

    /// Run the handler on its own task so a panic cannot take the caller
    /// down. On cancellation or timeout the dispatcher stops waiting; the
    /// handler is not killed.
    async fn run_local(
        &self,
        handler: Arc<dyn ToolHandler>,
        input: ValidatedInput,
        ctx: ExecutionContext,
        cancel: &CancellationToken,
    ) -> std::result::Result<Value, DispatchError> {
        let task = tokio::spawn(async move { handler.call(input, ctx).await });

        let waited = async {
            match self.config.local_timeout {
                Some(limit) => tokio::time::timeout(limit, task)
                    .await
                    .map_err(|_| DispatchError::LocalTimeout(limit)),
                None => Ok(task.await),
            }
        };

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            joined = waited => joined?,
        };

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(DispatchError::Handler(err)),
            Err(join_err) if join_err.is_panic() => {
                tracing::error!("tool handler panicked");
                Err(DispatchError::Panicked(panic_message(join_err.into_panic())))
            }
            Err(_) => Err(DispatchError::Panicked("handler task was aborted".to_string())),
        }
    }

    async fn run_remote(
        &self,
        endpoint: &RemoteEndpoint,
        input: ValidatedInput,
        client: &ToolkitClient,
    ) -> std::result::Result<Value, DispatchError> {
        let mut fields = match input.into_value() {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        let path = endpoint
            .template
            .render(&fields)
            .map_err(RemoteError::Request)?;
        for name in endpoint.template.placeholders() {
            fields.remove(name);
        }

        let request = OutboundRequest::from_fields(endpoint.template.method(), path, fields);
        let body = client.send(request).await?;

        match &endpoint.response {
            Some(mapping) => Ok(mapping.apply(&body).map_err(RemoteError::Malformed)?),
            None => Ok(body),
        }
    }
}

fn check_output(tool: &ToolDescriptor, value: Value) -> std::result::Result<Value, DispatchError> {
    if let Some(contract) = tool.output() {
        if let Err(errors) = contract.check(&value) {
            return Err(DispatchError::OutputMismatch {
                remote: matches!(tool.execution(), Execution::RemoteProxy(_)),
                detail: errors.join("; "),
            });
        }
    }
    Ok(value)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialResolver;
    use crate::envelope::ErrorKind;
    use crate::schema::SchemaNode;
    use crate::tools::HandlerError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn caller() -> CallerId {
        CallerId::try_from("user-1").unwrap()
    }

    fn dispatcher(registry: ToolRegistry, config: DispatchConfig) -> Dispatcher {
        Dispatcher::new(
            Arc::new(registry),
            Arc::new(StaticCredentialResolver::new()),
            config,
        )
        .unwrap()
    }

    fn add_numbers(calls: Arc<AtomicUsize>) -> ToolDescriptor {
        ToolDescriptor::local(
            "add_numbers",
            "Add two integers",
            SchemaNode::object()
                .field("a", SchemaNode::integer())
                .field("b", SchemaNode::integer()),
            move |input: ValidatedInput, _ctx: ExecutionContext| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let a = input.get("a").and_then(Value::as_i64).unwrap_or(0);
                    let b = input.get("b").and_then(Value::as_i64).unwrap_or(0);
                    Ok::<_, HandlerError>(json!(a + b))
                }
            },
        )
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn test_local_success_and_invalid_input() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::new();
        registry.register(add_numbers(calls.clone())).unwrap();
        let dispatcher = dispatcher(registry, DispatchConfig::default());

        let ok = dispatcher
            .invoke(
                InvocationRequest::new("add_numbers", json!({"a": 2, "b": 3}), caller()),
                CancellationToken::new(),
            )
            .await;
        assert!(ok.is_successful());
        assert_eq!(ok.data(), Some(&json!(5)));

        let bad = dispatcher
            .invoke(
                InvocationRequest::new("add_numbers", json!({"a": "x", "b": 3}), caller()),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(bad.error_kind(), Some(ErrorKind::InvalidInput));
        assert!(!bad.error().unwrap().violations.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dispatcher = dispatcher(ToolRegistry::new(), DispatchConfig::default());
        let env = dispatcher
            .invoke(
                InvocationRequest::new("missing", json!({}), caller()),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(env.error_kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::local(
                    "explode",
                    "Always panics",
                    SchemaNode::object(),
                    |_: ValidatedInput, _: ExecutionContext| async {
                        if true {
                            panic!("kaboom");
                        }
                        Ok::<_, HandlerError>(Value::Null)
                    },
                )
                .build()
                .unwrap(),
            )
            .unwrap();
        let dispatcher = dispatcher(registry, DispatchConfig::default());

        let env = dispatcher
            .invoke(
                InvocationRequest::new("explode", json!({}), caller()),
                CancellationToken::new(),
            )
            .await;
        let info = env.error().unwrap();
        assert_eq!(info.kind, ErrorKind::Handler);
        assert!(info.message.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_local_timeout() {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::local(
                    "sleepy",
                    "Sleeps",
                    SchemaNode::object(),
                    |_: ValidatedInput, _: ExecutionContext| async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok::<_, HandlerError>(Value::Null)
                    },
                )
                .build()
                .unwrap(),
            )
            .unwrap();
        let config = DispatchConfig {
            local_timeout: Some(Duration::from_millis(20)),
            ..DispatchConfig::default()
        };
        let dispatcher = dispatcher(registry, config);

        let env = dispatcher
            .invoke(
                InvocationRequest::new("sleepy", json!({}), caller()),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(env.error_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_local_output_contract() {
        let registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::local(
                    "wrong_shape",
                    "Returns a string",
                    SchemaNode::object(),
                    |_: ValidatedInput, _: ExecutionContext| async {
                        Ok::<_, HandlerError>(json!("five"))
                    },
                )
                .output_schema(SchemaNode::integer())
                .build()
                .unwrap(),
            )
            .unwrap();
        let dispatcher = dispatcher(registry, DispatchConfig::default());

        let env = dispatcher
            .invoke(
                InvocationRequest::new("wrong_shape", json!({}), caller()),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(env.error_kind(), Some(ErrorKind::Handler));
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "handler panicked");
    }
}
