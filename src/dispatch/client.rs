//! Authenticated HTTP calls against a toolkit's API.
//!
//! Used by the dispatcher for remote-proxy tools and handed to local handlers
//! through [`ExecutionContext::execute_request`](super::ExecutionContext::execute_request).

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::credentials::Credential;
use crate::envelope::ErrorKind;
use crate::tools::{HandlerError, HttpMethod, Toolkit};

/// Longest slice of an error response body kept in the message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Failure of a call against a toolkit API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request could not be built (bad path, bad header value).
    #[error("cannot build request: {0}")]
    Request(String),

    /// Connection, TLS, or body-read failure.
    #[error("remote call failed: {0}")]
    Transport(String),

    /// The API answered with a non-2xx status.
    #[error("remote API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The body was not JSON or did not fit the response mapping.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invocation cancelled")]
    Cancelled,
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Request(_) | RemoteError::Transport(_) | RemoteError::Status { .. } => {
                ErrorKind::RemoteCall
            }
            RemoteError::Timeout(_) => ErrorKind::Timeout,
            RemoteError::Malformed(_) => ErrorKind::MalformedResponse,
            RemoteError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RemoteError> for HandlerError {
    fn from(err: RemoteError) -> Self {
        HandlerError::with_kind(err.kind(), err.to_string())
    }
}

// =============================================================================
// Outbound request
// =============================================================================

/// Method, rendered path, and where the payload goes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OutboundRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl OutboundRequest {
    /// Route leftover input fields: JSON body for POST/PUT/PATCH, query
    /// string otherwise.
    pub fn from_fields(method: HttpMethod, path: String, fields: Map<String, Value>) -> Self {
        if method.sends_body() {
            return Self {
                method,
                path,
                query: Vec::new(),
                body: Some(Value::Object(fields)),
            };
        }
        Self {
            method,
            path,
            query: query_pairs(fields),
            body: None,
        }
    }
}

/// Nulls are skipped; arrays and objects are sent as JSON text.
fn query_pairs(fields: Map<String, Value>) -> Vec<(String, String)> {
    fields
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

// =============================================================================
// Client
// =============================================================================

/// A toolkit plus the credential and limits of one invocation.
#[derive(Debug, Clone)]
pub struct ToolkitClient {
    http: reqwest::Client,
    toolkit: Arc<Toolkit>,
    credential: Option<Credential>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl ToolkitClient {
    pub(crate) fn new(
        http: reqwest::Client,
        toolkit: Arc<Toolkit>,
        credential: Option<Credential>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            toolkit,
            credential,
            timeout,
            cancel,
        }
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    /// Call `path` on the toolkit API with the invocation's credential.
    ///
    /// For methods without a body, an object `body` is sent as query
    /// parameters.
    pub async fn execute_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RemoteError> {
        let request = match body {
            Some(body) if method.sends_body() => OutboundRequest {
                method,
                path: path.to_string(),
                query: Vec::new(),
                body: Some(body),
            },
            Some(Value::Object(fields)) => OutboundRequest::from_fields(method, path.to_string(), fields),
            Some(Value::Null) | None => OutboundRequest {
                method,
                path: path.to_string(),
                query: Vec::new(),
                body: None,
            },
            Some(_) => {
                return Err(RemoteError::Request(format!(
                    "{:?} requests take parameters as an object",
                    method
                )))
            }
        };
        self.send(request).await
    }

    /// Send with the configured timeout, giving up early on cancellation.
    pub(crate) async fn send(&self, request: OutboundRequest) -> Result<Value, RemoteError> {
        if self.toolkit.auth().requires_credential() && self.credential.is_none() {
            return Err(RemoteError::Request(format!(
                "toolkit '{}' needs a credential",
                self.toolkit.id()
            )));
        }

        let limit = self.timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RemoteError::Cancelled),
            outcome = tokio::time::timeout(limit, self.perform(request)) => {
                outcome.unwrap_or(Err(RemoteError::Timeout(limit)))
            }
        }
    }

    async fn perform(&self, request: OutboundRequest) -> Result<Value, RemoteError> {
        let url = self.toolkit.url_for(&request.path).map_err(RemoteError::Request)?;
        tracing::debug!(
            toolkit = %self.toolkit.id(),
            method = ?request.method,
            path = %url.path(),
            "sending remote request"
        );

        let mut builder = self.http.request(request.method.as_reqwest(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(credential) = &self.credential {
            builder = self
                .toolkit
                .auth()
                .apply(builder, credential)
                .map_err(RemoteError::Request)?;
        }

        // Errors drop the URL: query-attached credentials must not leak.
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.without_url().to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let mut message: String = text.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
            if message.is_empty() {
                message = status.canonical_reason().unwrap_or("request failed").to_string();
            }
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| RemoteError::Malformed(e.to_string()))
    }
}
