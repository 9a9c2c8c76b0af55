//! Declarative manifests of toolkits and remote-proxy tools.
//!
//! Remote tools are pure data (an endpoint plus schemas), so a whole catalog
//! of them can be described in JSON and installed at process start:
//!
//! ```json
//! {
//!   "toolkits": [
//!     {"id": "github", "base_url": "https://api.github.com", "auth": {"type": "bearer"}}
//!   ],
//!   "tools": [{
//!     "id": "get_repo_topics",
//!     "toolkit": "github",
//!     "description": "List repository topics",
//!     "method": "GET",
//!     "path": "/repos/{owner}/{repo}/topics",
//!     "input": {"type": "object", "fields": [
//!       {"name": "owner", "type": "string"},
//!       {"name": "repo", "type": "string"}
//!     ]},
//!     "response": {"type": "fields", "fields": [{"name": "topics", "pointer": "/names"}]}
//!   }]
//! }
//! ```
//!
//! Local tools carry code and are registered programmatically.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::schema::SchemaNode;
use crate::tools::{
    AuthAttachment, EndpointTemplate, HttpMethod, ResponseMapping, ToolDescriptor, ToolRegistry,
    Toolkit,
};
use crate::types::{Error, Result};

/// A toolkit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ToolkitDecl {
    pub id: String,
    /// Base URL every endpoint path is relative to.
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthAttachment,
}

/// A remote-proxy tool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RemoteToolDecl {
    pub id: String,
    pub toolkit: String,
    pub description: String,
    pub method: HttpMethod,
    /// Path with `{field}` placeholders, e.g. `/repos/{owner}/{repo}/topics`.
    pub path: String,
    /// Object schema for the tool input.
    pub input: SchemaNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<SchemaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseMapping>,
}

impl RemoteToolDecl {
    fn to_descriptor(&self) -> Result<ToolDescriptor> {
        let template = EndpointTemplate::new(self.method, &self.path)?;
        let mut builder = ToolDescriptor::remote(
            &self.id,
            &self.toolkit,
            &self.description,
            self.input.clone(),
            template,
        )
        .tags(self.tags.iter().cloned());
        if let Some(output) = &self.output {
            builder = builder.output_schema(output.clone());
        }
        if let Some(mapping) = &self.response {
            builder = builder.response_mapping(mapping.clone());
        }
        builder.build()
    }
}

/// A set of toolkit and remote-tool declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub toolkits: Vec<ToolkitDecl>,
    #[serde(default)]
    pub tools: Vec<RemoteToolDecl>,
}

impl Manifest {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Register every toolkit, then every tool. Returns the number of tools
    /// installed.
    ///
    /// All entries are checked before anything is registered, so a malformed
    /// manifest leaves the registry untouched. Duplicate-id handling follows
    /// the registry's policy.
    pub fn install(&self, registry: &ToolRegistry) -> Result<usize> {
        let toolkits = self
            .toolkits
            .iter()
            .map(|t| Toolkit::new(&t.id, &t.base_url, t.auth.clone()))
            .collect::<Result<Vec<_>>>()?;
        let tools = self
            .tools
            .iter()
            .map(RemoteToolDecl::to_descriptor)
            .collect::<Result<Vec<_>>>()?;
        for tool in &self.tools {
            let declared = toolkits.iter().any(|t| t.id().as_str() == tool.toolkit);
            if !declared && registry.toolkit(&tool.toolkit).is_none() {
                return Err(Error::not_found(format!(
                    "toolkit '{}' for tool '{}'",
                    tool.toolkit, tool.id
                )));
            }
        }

        for toolkit in toolkits {
            registry.register_toolkit(toolkit);
        }
        let count = tools.len();
        for tool in tools {
            registry.register(tool)?;
        }
        tracing::info!(toolkits = self.toolkits.len(), tools = count, "manifest installed");
        Ok(count)
    }

    /// JSON Schema describing the manifest format.
    pub fn json_schema() -> Value {
        let schema = schemars::schema_for!(Manifest);
        serde_json::to_value(schema).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolFilter;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const GITHUB: &str = r#"{
        "toolkits": [
            {"id": "github", "base_url": "https://api.github.com", "auth": {"type": "bearer"}}
        ],
        "tools": [{
            "id": "get_repo_topics",
            "toolkit": "github",
            "description": "List repository topics",
            "method": "GET",
            "path": "/repos/{owner}/{repo}/topics",
            "input": {"type": "object", "fields": [
                {"name": "owner", "type": "string"},
                {"name": "repo", "type": "string", "description": "Repository name"}
            ]},
            "tags": ["vcs"],
            "response": {"type": "fields", "fields": [{"name": "topics", "pointer": "/names"}]}
        }]
    }"#;

    #[test]
    fn test_install_github_manifest() {
        let manifest = Manifest::from_json_str(GITHUB).unwrap();
        let registry = ToolRegistry::new();
        assert_eq!(manifest.install(&registry).unwrap(), 1);

        let tool = registry.lookup("get_repo_topics").unwrap();
        assert_eq!(tool.toolkit_name(), "github");
        assert!(tool.has_tag("vcs"));
        assert_eq!(
            registry.render_prompt(&ToolFilter::all()),
            "Available tools:\n- get_repo_topics(owner: string, repo: string): List repository topics"
        );
    }

    #[test]
    fn test_malformed_manifest_installs_nothing() {
        let mut manifest = Manifest::from_json_str(GITHUB).unwrap();
        manifest.tools[0].path = "/repos/{owner}/{missing}".into();

        let registry = ToolRegistry::new();
        assert!(manifest.install(&registry).is_err());
        assert!(registry.is_empty());
        assert!(registry.toolkit("github").is_none());
    }

    #[test]
    fn test_undeclared_toolkit_installs_nothing() {
        let mut manifest = Manifest::from_json_str(GITHUB).unwrap();
        manifest.tools[0].toolkit = "gitlab".into();

        let registry = ToolRegistry::new();
        let err = manifest.install(&registry).unwrap_err();
        assert!(err.to_string().contains("gitlab"));
        assert!(registry.toolkit("github").is_none());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Manifest::from_json_str(r#"{"toolkits": [], "plugins": []}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GITHUB.as_bytes()).unwrap();
        let manifest = Manifest::from_file(file.path()).unwrap();
        assert_eq!(manifest.toolkits.len(), 1);
    }

    #[test]
    fn test_json_schema_lists_sections() {
        let schema = Manifest::json_schema();
        assert!(schema["properties"]["toolkits"].is_object());
        assert!(schema["properties"]["tools"].is_object());
    }
}
