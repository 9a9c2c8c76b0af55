//! Core types for tooldock.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ToolId, ToolkitId, CallerId, InvocationId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for dispatch, registry, and credentials

mod config;
mod errors;
mod ids;

pub use config::{
    Config, CredentialCacheConfig, DispatchConfig, DuplicatePolicy, ObservabilityConfig,
    RegistryConfig, ENV_CREDENTIAL_TTL_SECS, ENV_DUPLICATE_POLICY, ENV_LOCAL_TIMEOUT_MS,
    ENV_REMOTE_TIMEOUT_MS,
};
pub use errors::{Error, Result};
pub use ids::{CallerId, InvocationId, ToolId, ToolkitId};
