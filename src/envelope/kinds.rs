//! Fixed error taxonomy for envelopes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    DuplicateTool,
    InvalidInput,
    Credential,
    Handler,
    RemoteCall,
    Timeout,
    MalformedResponse,
    Cancelled,
}

impl ErrorKind {
    /// Recoverable kinds can succeed on retry after the cause is fixed.
    ///
    /// `RemoteCall` is refined by HTTP status in
    /// [`ErrorInfo::is_recoverable`](super::ErrorInfo::is_recoverable).
    pub fn is_recoverable(self) -> bool {
        match self {
            ErrorKind::NotFound
            | ErrorKind::InvalidInput
            | ErrorKind::Credential
            | ErrorKind::RemoteCall
            | ErrorKind::Timeout
            | ErrorKind::Cancelled => true,
            ErrorKind::DuplicateTool | ErrorKind::Handler | ErrorKind::MalformedResponse => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::DuplicateTool => "DUPLICATE_TOOL",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Credential => "CREDENTIAL",
            ErrorKind::Handler => "HANDLER",
            ErrorKind::RemoteCall => "REMOTE_CALL",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    pub(crate) fn default_message(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "tool not found",
            ErrorKind::DuplicateTool => "tool already registered",
            ErrorKind::InvalidInput => "input does not match schema",
            ErrorKind::Credential => "no usable credential",
            ErrorKind::Handler => "tool handler failed",
            ErrorKind::RemoteCall => "remote call failed",
            ErrorKind::Timeout => "tool call timed out",
            ErrorKind::MalformedResponse => "remote response does not match declared output",
            ErrorKind::Cancelled => "invocation cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
