//! Execution dispatch: from an invocation request to a result envelope.
//!
//! The [`Dispatcher`] looks the tool up, validates the input, resolves the
//! toolkit credential when one is needed, and then either runs the local
//! handler or proxies the call to the toolkit's API. Whatever happens, the
//! caller gets a [`ResultEnvelope`](crate::envelope::ResultEnvelope).

mod client;
mod context;
mod dispatcher;
mod error;
mod state;

pub use client::{RemoteError, ToolkitClient};
pub use context::ExecutionContext;
pub use dispatcher::{Dispatcher, InvocationRequest};
pub use error::DispatchError;
pub use state::InvocationState;
