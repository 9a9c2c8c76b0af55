//! Credential resolution: the contract the dispatcher depends on.
//!
//! Issuing and storing credentials is somebody else's job. The dispatcher
//! only asks a [`CredentialResolver`] for a usable [`Credential`] per
//! `(toolkit, caller)` and attaches it the way the toolkit says.

mod cache;
mod fixed;

pub use cache::CachingResolver;
pub use fixed::StaticCredentialResolver;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::types::{CallerId, ToolkitId};

/// Opaque secret plus optional expiry. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Why no usable credential could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("no credential for toolkit '{toolkit}' and caller '{caller}'")]
    NotFound { toolkit: ToolkitId, caller: CallerId },

    #[error("credential for toolkit '{toolkit}' has expired")]
    Expired { toolkit: ToolkitId },

    #[error("credential resolver unavailable: {0}")]
    Unavailable(String),
}

/// Produces credentials for `(toolkit, caller)` pairs.
///
/// Implementations must be safe to call concurrently and should return the
/// same credential for repeated calls within a short window.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(
        &self,
        toolkit: &ToolkitId,
        caller: &CallerId,
    ) -> Result<Credential, CredentialError>;

    /// Forget anything cached for the pair, e.g. after the remote API
    /// rejected the credential.
    fn invalidate(&self, _toolkit: &ToolkitId, _caller: &CallerId) {}
}

#[async_trait]
impl<T> CredentialResolver for Arc<T>
where
    T: CredentialResolver + ?Sized,
{
    async fn resolve(
        &self,
        toolkit: &ToolkitId,
        caller: &CallerId,
    ) -> Result<Credential, CredentialError> {
        (**self).resolve(toolkit, caller).await
    }

    fn invalidate(&self, toolkit: &ToolkitId, caller: &CallerId) {
        (**self).invalidate(toolkit, caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::new("ghp_supersecret");
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let cred = Credential::new("t").with_expiry(now + Duration::minutes(5));
        assert!(!cred.is_expired_at(now));
        assert!(cred.is_expired_at(now + Duration::minutes(5)));
        assert!(!Credential::new("t").is_expired());
    }
}
