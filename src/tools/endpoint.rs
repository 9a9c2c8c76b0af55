//! Remote endpoint templates and response mappings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::value_type_name;
use crate::types::{Error, Result};

/// HTTP method of a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Leftover input fields go in a JSON body rather than the query string.
    pub fn sends_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

// =============================================================================
// Path template
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Path pattern plus method, relative to a toolkit's base URL.
///
/// Placeholders are written `{name}` and are filled from top-level input
/// fields: `/repos/{owner}/{repo}/topics`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    method: HttpMethod,
    path: String,
    segments: Vec<Segment>,
}

impl EndpointTemplate {
    pub fn new(method: HttpMethod, path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(Error::validation(format!(
                "endpoint path '{}' must start with '/'",
                path
            )));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = path.chars();
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        if !(inner.is_ascii_alphanumeric() || inner == '_') {
                            return Err(Error::validation(format!(
                                "endpoint path '{}' has invalid placeholder character '{}'",
                                path, inner
                            )));
                        }
                        name.push(inner);
                    }
                    if !closed || name.is_empty() {
                        return Err(Error::validation(format!(
                            "endpoint path '{}' has an unterminated or empty placeholder",
                            path
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Param(name));
                }
                '}' => {
                    return Err(Error::validation(format!(
                        "endpoint path '{}' has an unmatched '}}'",
                        path
                    )))
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            method,
            path: path.to_string(),
            segments,
        })
    }

    pub fn get(path: &str) -> Result<Self> {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: &str) -> Result<Self> {
        Self::new(HttpMethod::Post, path)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute placeholders from `input`, percent-encoding each value.
    pub fn render(&self, input: &Map<String, Value>) -> std::result::Result<String, String> {
        let mut out = String::with_capacity(self.path.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param(name) => {
                    let raw = match input.get(name) {
                        Some(Value::String(s)) => s.clone(),
                        Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
                        Some(other) => {
                            return Err(format!(
                                "path parameter '{}' must be a scalar, got {}",
                                name,
                                value_type_name(other)
                            ))
                        }
                        None => return Err(format!("path parameter '{}' is missing", name)),
                    };
                    if matches!(raw.as_str(), "" | "." | "..") {
                        return Err(format!(
                            "path parameter '{}' must not be empty or a dot segment",
                            name
                        ));
                    }
                    out.push_str(&urlencoding::encode(&raw));
                }
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Response mapping
// =============================================================================

/// One output field taken from the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldMapping {
    /// Output field name.
    pub name: String,
    /// JSON pointer into the response body, e.g. `/names`.
    pub pointer: String,
    /// Emit `null` instead of failing when the pointer misses.
    #[serde(default)]
    pub optional: bool,
}

/// Reshapes a remote response body into the tool's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseMapping {
    /// Use the value at a JSON pointer.
    Extract { pointer: String },
    /// Build an object from pointers into the body.
    Fields { fields: Vec<FieldMapping> },
}

impl ResponseMapping {
    pub fn extract(pointer: impl Into<String>) -> Self {
        ResponseMapping::Extract {
            pointer: pointer.into(),
        }
    }

    /// Start a field mapping; chain [`ResponseMapping::field`].
    pub fn fields() -> Self {
        ResponseMapping::Fields { fields: Vec::new() }
    }

    /// Add `name <- pointer`. No-op on an `Extract` mapping.
    pub fn field(mut self, name: impl Into<String>, pointer: impl Into<String>) -> Self {
        if let ResponseMapping::Fields { fields } = &mut self {
            fields.push(FieldMapping {
                name: name.into(),
                pointer: pointer.into(),
                optional: false,
            });
        }
        self
    }

    pub(crate) fn check(&self) -> Result<()> {
        let pointers: Vec<&str> = match self {
            ResponseMapping::Extract { pointer } => vec![pointer.as_str()],
            ResponseMapping::Fields { fields } => {
                if fields.is_empty() {
                    return Err(Error::validation("response mapping declares no fields"));
                }
                fields.iter().map(|f| f.pointer.as_str()).collect()
            }
        };
        for pointer in pointers {
            if !(pointer.is_empty() || pointer.starts_with('/')) {
                return Err(Error::validation(format!(
                    "response pointer '{}' must be empty or start with '/'",
                    pointer
                )));
            }
        }
        Ok(())
    }

    /// Apply to a parsed response body.
    pub fn apply(&self, body: &Value) -> std::result::Result<Value, String> {
        match self {
            ResponseMapping::Extract { pointer } => body
                .pointer(pointer)
                .cloned()
                .ok_or_else(|| format!("response has no value at '{}'", pointer)),
            ResponseMapping::Fields { fields } => {
                let mut out = Map::new();
                for field in fields {
                    match body.pointer(&field.pointer) {
                        Some(v) => {
                            out.insert(field.name.clone(), v.clone());
                        }
                        None if field.optional => {
                            out.insert(field.name.clone(), Value::Null);
                        }
                        None => {
                            return Err(format!(
                                "response has no value at '{}' for field '{}'",
                                field.pointer, field.name
                            ))
                        }
                    }
                }
                Ok(Value::Object(out))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_placeholders() {
        let t = EndpointTemplate::get("/repos/{owner}/{repo}/topics").unwrap();
        assert_eq!(t.placeholders().collect::<Vec<_>>(), vec!["owner", "repo"]);
        assert_eq!(t.method(), HttpMethod::Get);
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert!(EndpointTemplate::get("repos/{owner}").is_err());
        assert!(EndpointTemplate::get("/repos/{owner").is_err());
        assert!(EndpointTemplate::get("/repos/{}").is_err());
        assert!(EndpointTemplate::get("/repos/owner}").is_err());
        assert!(EndpointTemplate::get("/repos/{own-er}").is_err());
    }

    #[test]
    fn test_render_encodes_values() {
        let t = EndpointTemplate::get("/repos/{owner}/{repo}/issues/{number}").unwrap();
        let input = json!({"owner": "a b", "repo": "x/y", "number": 42});
        assert_eq!(
            t.render(input.as_object().unwrap()).unwrap(),
            "/repos/a%20b/x%2Fy/issues/42"
        );
    }

    #[test]
    fn test_render_rejects_dot_segments() {
        let t = EndpointTemplate::get("/repos/{owner}/{repo}/topics").unwrap();
        for bad in [json!({"owner": "..", "repo": ".."}), json!({"owner": ".", "repo": "r"}), json!({"owner": "o", "repo": ""})] {
            let err = t.render(bad.as_object().unwrap()).unwrap_err();
            assert!(err.contains("dot segment"), "{}", err);
        }
        let ok = json!({"owner": "...", "repo": "%2e%2e"});
        assert_eq!(
            t.render(ok.as_object().unwrap()).unwrap(),
            "/repos/.../%252e%252e/topics"
        );
    }

    #[test]
    fn test_render_rejects_non_scalar() {
        let t = EndpointTemplate::get("/repos/{owner}").unwrap();
        let input = json!({"owner": ["a"]});
        let err = t.render(input.as_object().unwrap()).unwrap_err();
        assert!(err.contains("must be a scalar"));
    }

    #[test]
    fn test_field_mapping() {
        let mapping = ResponseMapping::fields().field("topics", "/names");
        assert_eq!(
            mapping.apply(&json!({"names": ["a", "b"]})).unwrap(),
            json!({"topics": ["a", "b"]})
        );
        assert!(mapping.apply(&json!({"other": 1})).is_err());
    }

    #[test]
    fn test_extract_mapping() {
        let mapping = ResponseMapping::extract("/data/items/0");
        assert_eq!(
            mapping.apply(&json!({"data": {"items": [7, 8]}})).unwrap(),
            json!(7)
        );
        assert!(ResponseMapping::extract("data").check().is_err());
    }
}
