//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. These cover registration, configuration
//! and manifest loading. Invocation failures never surface as `Error`; the
//! dispatcher reports them inside a [`ResultEnvelope`](crate::envelope::ResultEnvelope).

use thiserror::Error;

use crate::envelope::ErrorKind;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for tooldock.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed descriptor, schema, or identifier.
    #[error("validation error: {0}")]
    Validation(String),

    /// Tool or toolkit not registered.
    #[error("not found: {0}")]
    NotFound(String),

    /// Tool id collision under the reject policy.
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Envelope error kind for errors that can reach a caller.
    ///
    /// Configuration and I/O failures happen before any invocation and have
    /// no envelope counterpart.
    pub fn envelope_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Validation(_) => Some(ErrorKind::InvalidInput),
            Error::NotFound(_) => Some(ErrorKind::NotFound),
            Error::DuplicateTool(_) => Some(ErrorKind::DuplicateTool),
            Error::Config(_) | Error::Serialization(_) | Error::Io(_) => None,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn duplicate_tool(msg: impl Into<String>) -> Self {
        Self::DuplicateTool(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
