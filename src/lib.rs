//! # Tooldock - Tool Registration & Managed-Execution Dispatch
//!
//! Turns local functions and third-party API endpoints into uniform,
//! schema-validated, authenticated tools an LLM runtime can call:
//! - Declarative input/output schemas with full violation reporting
//! - A thread-safe registry of tools and the toolkits they belong to
//! - Credential resolution behind a trait, with a single-flight cache
//! - A dispatcher that runs local handlers or proxies HTTP calls
//! - One result envelope and a fixed error taxonomy for every outcome
//!
//! ## Architecture
//!
//! ```text
//!   InvocationRequest
//!          │
//!          ▼
//!   ┌──────────────┐  lookup   ┌──────────────┐
//!   │  Dispatcher  │ ────────▶ │ ToolRegistry │
//!   └──────────────┘           └──────────────┘
//!          │ validate (schema)
//!          ├── Local ───────▶ ToolHandler (spawned task)
//!          └── RemoteProxy ─▶ CredentialResolver ─▶ toolkit API (reqwest)
//!          │
//!          ▼
//!   ResultEnvelope { successful, data | error }
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use tooldock::credentials::StaticCredentialResolver;
//! use tooldock::dispatch::{Dispatcher, ExecutionContext, InvocationRequest};
//! use tooldock::schema::{SchemaNode, ValidatedInput};
//! use tooldock::tools::{HandlerError, ToolDescriptor, ToolRegistry};
//! use tooldock::types::{CallerId, DispatchConfig};
//!
//! # async fn run() -> tooldock::Result<()> {
//! let registry = Arc::new(ToolRegistry::new());
//! registry.register(
//!     ToolDescriptor::local(
//!         "add_numbers",
//!         "Add two integers",
//!         SchemaNode::object()
//!             .field("a", SchemaNode::integer())
//!             .field("b", SchemaNode::integer()),
//!         |input: ValidatedInput, _ctx: ExecutionContext| async move {
//!             let a = input.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
//!             let b = input.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
//!             Ok::<_, HandlerError>(json!(a + b))
//!         },
//!     )
//!     .build()?,
//! )?;
//!
//! let dispatcher = Dispatcher::new(
//!     registry,
//!     Arc::new(StaticCredentialResolver::new()),
//!     DispatchConfig::default(),
//! )?;
//! let caller = CallerId::try_from("user-1").map_err(tooldock::Error::validation)?;
//! let envelope = dispatcher
//!     .invoke(
//!         InvocationRequest::new("add_numbers", json!({"a": 2, "b": 3}), caller),
//!         CancellationToken::new(),
//!     )
//!     .await;
//! assert_eq!(envelope.data(), Some(&json!(5)));
//! # Ok(())
//! # }
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod credentials;
pub mod declarations;
pub mod dispatch;
pub mod envelope;
pub mod schema;
pub mod tools;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use types::{Config, Error, Result};
