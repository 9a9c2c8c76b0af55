//! Tool registry: the in-memory catalog of descriptors and toolkits.
//!
//! Reads take a shared lock just long enough to clone an `Arc`; nothing
//! holds the lock across an await.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::{Execution, ToolDescriptor};
use super::toolkit::Toolkit;
use crate::types::{DuplicatePolicy, Error, RegistryConfig, Result, ToolId, ToolkitId};

// =============================================================================
// Filter
// =============================================================================

/// Listing filter. Dimensions combine with AND; values within one
/// dimension match any-of. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    pub ids: Option<Vec<String>>,
    pub toolkit_ids: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl ToolFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn toolkits<I, S>(mut self, toolkits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.toolkit_ids = Some(toolkits.into_iter().map(Into::into).collect());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, tool: &ToolDescriptor) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == tool.id().as_str()) {
                return false;
            }
        }
        if let Some(toolkits) = &self.toolkit_ids {
            if !toolkits.iter().any(|t| t == tool.toolkit_name()) {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if !tags.iter().any(|t| tool.has_tag(t)) {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Default)]
struct Catalog {
    tools: HashMap<ToolId, Arc<ToolDescriptor>>,
    order: Vec<ToolId>,
    toolkits: HashMap<ToolkitId, Arc<Toolkit>>,
}

impl Catalog {
    fn ordered(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.order.iter().filter_map(|id| self.tools.get(id))
    }
}

/// Thread-safe catalog of tools and the toolkits they belong to.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    policy: DuplicatePolicy,
    inner: RwLock<Catalog>,
}

impl ToolRegistry {
    /// Registry with the default (reject) duplicate policy.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            inner: RwLock::new(Catalog::default()),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::with_policy(config.duplicate_policy)
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    // -- toolkits -------------------------------------------------------------

    /// Add or replace a toolkit definition.
    pub fn register_toolkit(&self, toolkit: Toolkit) {
        tracing::debug!(toolkit = %toolkit.id(), base_url = %toolkit.base_url(), "registering toolkit");
        self.inner
            .write()
            .toolkits
            .insert(toolkit.id().clone(), Arc::new(toolkit));
    }

    pub fn toolkit(&self, id: &str) -> Option<Arc<Toolkit>> {
        self.inner.read().toolkits.get(id).cloned()
    }

    /// Remove a toolkit. Fails while any registered tool still belongs to it.
    pub fn deregister_toolkit(&self, id: &str) -> Result<Arc<Toolkit>> {
        let mut catalog = self.inner.write();
        if let Some(tool) = catalog
            .ordered()
            .find(|t| t.toolkit_id().is_some_and(|k| k.as_str() == id))
        {
            return Err(Error::validation(format!(
                "toolkit '{}' is still used by tool '{}'",
                id,
                tool.id()
            )));
        }
        catalog
            .toolkits
            .remove(id)
            .ok_or_else(|| Error::not_found(format!("toolkit '{}'", id)))
    }

    // -- tools ----------------------------------------------------------------

    /// Register a tool according to the duplicate policy.
    ///
    /// Remote-proxy tools need their toolkit registered first. Under
    /// [`DuplicatePolicy::Replace`] the old descriptor is swapped in place and
    /// keeps its listing position.
    pub fn register(&self, descriptor: ToolDescriptor) -> Result<()> {
        let mut catalog = self.inner.write();

        if let Execution::RemoteProxy(_) = descriptor.execution() {
            let known = descriptor
                .toolkit_id()
                .is_some_and(|k| catalog.toolkits.contains_key(k));
            if !known {
                return Err(Error::not_found(format!(
                    "toolkit '{}' for remote tool '{}'",
                    descriptor.toolkit_name(),
                    descriptor.id()
                )));
            }
        }

        let id = descriptor.id().clone();
        let exists = catalog.tools.contains_key(&id);
        match (exists, self.policy) {
            (true, DuplicatePolicy::Reject) => {
                return Err(Error::duplicate_tool(format!("'{}' is already registered", id)));
            }
            (true, DuplicatePolicy::Replace) => {
                tracing::info!(tool = %id, "replacing tool");
            }
            (false, _) => {
                tracing::debug!(tool = %id, kind = descriptor.execution().kind_name(), "registering tool");
                catalog.order.push(id.clone());
            }
        }
        catalog.tools.insert(id, Arc::new(descriptor));
        Ok(())
    }

    /// Remove a tool. In-flight invocations keep their `Arc` and finish.
    pub fn deregister(&self, id: &str) -> Result<Arc<ToolDescriptor>> {
        let mut catalog = self.inner.write();
        let removed = catalog
            .tools
            .remove(id)
            .ok_or_else(|| Error::not_found(format!("tool '{}'", id)))?;
        catalog.order.retain(|t| t.as_str() != id);
        tracing::debug!(tool = %id, "deregistered tool");
        Ok(removed)
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<ToolDescriptor>> {
        self.inner
            .read()
            .tools
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("tool '{}'", id)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().tools.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tools.is_empty()
    }

    /// Matching descriptors in registration order.
    pub fn list(&self, filter: &ToolFilter) -> Vec<Arc<ToolDescriptor>> {
        self.inner
            .read()
            .ordered()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect()
    }

    /// Function-calling declarations for the matching tools.
    pub fn declarations(&self, filter: &ToolFilter) -> Vec<Value> {
        self.list(filter).iter().map(|t| t.declaration()).collect()
    }

    /// Plain-text tool listing for LLM prompts. Empty when nothing matches.
    pub fn render_prompt(&self, filter: &ToolFilter) -> String {
        let tools = self.list(filter);
        if tools.is_empty() {
            return String::new();
        }

        let mut lines = Vec::with_capacity(tools.len() + 1);
        lines.push("Available tools:".to_string());
        for tool in tools {
            lines.push(tool.to_prompt_line());
        }
        lines.join("\n")
    }
}
