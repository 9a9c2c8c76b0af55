//! Tool infrastructure — toolkits, endpoints, descriptors, and the registry.
//!
//! A tool is either a local handler or a proxy onto an endpoint of its
//! toolkit's API. Both are described by a [`ToolDescriptor`] and stored in a
//! [`ToolRegistry`]; the dispatcher never needs to know which service a tool
//! talks to.

pub mod descriptor;
pub mod endpoint;
pub mod registry;
pub mod toolkit;

pub use descriptor::{
    DescriptorBuilder, Execution, HandlerError, RemoteEndpoint, ToolDescriptor, ToolHandler,
};
pub use endpoint::{EndpointTemplate, FieldMapping, HttpMethod, ResponseMapping};
pub use registry::{ToolFilter, ToolRegistry};
pub use toolkit::{AuthAttachment, Toolkit};
