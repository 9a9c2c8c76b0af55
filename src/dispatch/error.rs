//! Dispatcher-internal failures and their envelope mapping.

use std::time::Duration;
use thiserror::Error;

use super::client::RemoteError;
use crate::credentials::CredentialError;
use crate::envelope::{ErrorInfo, ErrorKind, ResultEnvelope};
use crate::schema::ValidationError;
use crate::tools::HandlerError;

/// Everything that can go wrong inside one invocation.
///
/// Never escapes [`Dispatcher::invoke`](super::Dispatcher::invoke); it is
/// turned into a failed [`ResultEnvelope`] at the boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("tool '{0}' is not registered")]
    NotFound(String),

    #[error("toolkit '{0}' is not registered")]
    ToolkitMissing(String),

    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("{0}")]
    Credential(#[from] CredentialError),

    #[error("{0}")]
    Handler(HandlerError),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler did not finish within {0:?}")]
    LocalTimeout(Duration),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Result does not fit the declared output shape.
    #[error("output does not match declared shape: {detail}")]
    OutputMismatch { remote: bool, detail: String },

    #[error("invocation cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::NotFound(_) | DispatchError::ToolkitMissing(_) => ErrorKind::NotFound,
            DispatchError::InvalidInput(_) => ErrorKind::InvalidInput,
            DispatchError::Credential(_) => ErrorKind::Credential,
            DispatchError::Handler(err) => err.kind(),
            DispatchError::Panicked(_) => ErrorKind::Handler,
            DispatchError::LocalTimeout(_) => ErrorKind::Timeout,
            DispatchError::Remote(err) => err.kind(),
            DispatchError::OutputMismatch { remote: true, .. } => ErrorKind::MalformedResponse,
            DispatchError::OutputMismatch { remote: false, .. } => ErrorKind::Handler,
            DispatchError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Failed envelope with a sanitized message of at most `max_message_len`
    /// characters.
    pub fn into_envelope(self, max_message_len: usize) -> ResultEnvelope {
        let mut info = ErrorInfo::new(self.kind(), &self.to_string(), max_message_len);
        match self {
            DispatchError::InvalidInput(err) => info = info.with_violations(err.violations),
            DispatchError::Remote(err) => {
                if let Some(status) = err.status() {
                    info = info.with_status(status);
                }
            }
            _ => {}
        }
        ResultEnvelope::failure(info)
    }
}
