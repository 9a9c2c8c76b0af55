//! Toolkits: the external service a group of tools talks to.
//!
//! A toolkit owns the base URL remote endpoints are relative to and the
//! strategy for attaching a credential to outbound requests. Nothing about a
//! particular service is hardcoded anywhere else.

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Url};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::credentials::Credential;
use crate::types::{Error, Result, ToolkitId};
use crate::validation::{validate_base_url, validate_non_empty};

/// How a credential is attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthAttachment {
    /// Toolkit needs no credential.
    #[default]
    None,
    /// `Authorization: Bearer <secret>`.
    Bearer,
    /// `<name>: <prefix><secret>`.
    Header {
        name: String,
        #[serde(default)]
        prefix: String,
    },
    /// `?<param>=<secret>`.
    Query { param: String },
}

impl AuthAttachment {
    pub fn requires_credential(&self) -> bool {
        !matches!(self, AuthAttachment::None)
    }

    fn check(&self) -> Result<()> {
        match self {
            AuthAttachment::Header { name, .. } => {
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    Error::validation(format!("invalid auth header name '{}': {}", name, e))
                })?;
                Ok(())
            }
            AuthAttachment::Query { param } => validate_non_empty(param, "auth query param"),
            AuthAttachment::None | AuthAttachment::Bearer => Ok(()),
        }
    }

    /// Attach `credential` to `request`.
    pub(crate) fn apply(
        &self,
        request: RequestBuilder,
        credential: &Credential,
    ) -> std::result::Result<RequestBuilder, String> {
        match self {
            AuthAttachment::None => Ok(request),
            AuthAttachment::Bearer => Ok(request.bearer_auth(credential.secret())),
            AuthAttachment::Header { name, prefix } => {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| format!("invalid auth header name: {}", e))?;
                let mut value = HeaderValue::from_str(&format!("{}{}", prefix, credential.secret()))
                    .map_err(|_| "credential is not a valid header value".to_string())?;
                value.set_sensitive(true);
                Ok(request.header(name, value))
            }
            AuthAttachment::Query { param } => {
                Ok(request.query(&[(param.as_str(), credential.secret())]))
            }
        }
    }
}

/// A registered external service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolkit {
    id: ToolkitId,
    base_url: Url,
    auth: AuthAttachment,
}

impl Toolkit {
    pub fn new(id: &str, base_url: &str, auth: AuthAttachment) -> Result<Self> {
        let id = ToolkitId::try_from(id).map_err(Error::validation)?;
        let base_url = validate_base_url(base_url, "toolkit base_url")?;
        auth.check()?;
        Ok(Self { id, base_url, auth })
    }

    pub fn id(&self) -> &ToolkitId {
        &self.id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthAttachment {
        &self.auth
    }

    /// Join a rendered endpoint path onto the base URL.
    ///
    /// The base path is kept: `https://h/api/v3` + `/repos/o/r` gives
    /// `https://h/api/v3/repos/o/r`. A path that normalizes to somewhere
    /// outside the base path is refused.
    pub fn url_for(&self, path: &str) -> std::result::Result<Url, String> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        let url = Url::parse(&joined).map_err(|e| format!("cannot build request URL: {}", e))?;

        let base_path = self.base_url.path().trim_end_matches('/');
        let stays_under_base = url.host_str() == self.base_url.host_str()
            && url.port_or_known_default() == self.base_url.port_or_known_default()
            && url
                .path()
                .strip_prefix(base_path)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if !stays_under_base {
            return Err(format!(
                "request path '{}' escapes the toolkit base URL",
                path
            ));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_keeps_base_path() {
        let toolkit = Toolkit::new("ghe", "https://git.example.com/api/v3/", AuthAttachment::Bearer)
            .unwrap();
        assert_eq!(
            toolkit.url_for("/repos/o/r/topics").unwrap().as_str(),
            "https://git.example.com/api/v3/repos/o/r/topics"
        );
    }

    #[test]
    fn test_url_for_refuses_escaping_paths() {
        let toolkit =
            Toolkit::new("ghe", "https://api.example.com/v3", AuthAttachment::Bearer).unwrap();
        let err = toolkit.url_for("/repos/../../topics").unwrap_err();
        assert!(err.contains("escapes"));
        assert!(toolkit.url_for("/../v3x/repos").is_err());
        assert!(toolkit.url_for("/repos/o/../r").is_ok());
    }

    #[test]
    fn test_rejects_bad_definitions() {
        assert!(Toolkit::new("gh", "api.github.com", AuthAttachment::Bearer).is_err());
        assert!(Toolkit::new(
            "gh",
            "https://api.github.com",
            AuthAttachment::Header {
                name: "bad header".into(),
                prefix: String::new()
            }
        )
        .is_err());
        assert!(Toolkit::new("", "https://api.github.com", AuthAttachment::None).is_err());
    }

    #[test]
    fn test_apply_attachments() {
        let client = reqwest::Client::new();
        let cred = Credential::new("s3cret");

        let req = AuthAttachment::Bearer
            .apply(client.get("https://x.test/a"), &cred)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer s3cret");

        let req = AuthAttachment::Header {
            name: "X-Api-Key".into(),
            prefix: "Token ".into(),
        }
        .apply(client.get("https://x.test/a"), &cred)
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(req.headers()["x-api-key"], "Token s3cret");
        assert!(req.headers()["x-api-key"].is_sensitive());

        let req = AuthAttachment::Query {
            param: "api_key".into(),
        }
        .apply(client.get("https://x.test/a?page=2"), &cred)
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(req.url().query(), Some("page=2&api_key=s3cret"));
    }

    #[test]
    fn test_serde_tagging() {
        let auth: AuthAttachment =
            serde_json::from_str(r#"{"type": "header", "name": "X-Api-Key"}"#).unwrap();
        assert_eq!(
            auth,
            AuthAttachment::Header {
                name: "X-Api-Key".into(),
                prefix: String::new()
            }
        );
        assert!(!AuthAttachment::None.requires_credential());
    }
}
