//! In-memory resolver for embedding and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Credential, CredentialError, CredentialResolver};
use crate::types::{CallerId, ToolkitId};

/// Serves credentials from a fixed table.
///
/// A caller-specific entry wins over the toolkit-wide one.
#[derive(Debug, Default)]
pub struct StaticCredentialResolver {
    per_caller: RwLock<HashMap<(ToolkitId, CallerId), Credential>>,
    toolkit_wide: RwLock<HashMap<ToolkitId, Credential>>,
    calls: AtomicUsize,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credential for one caller of a toolkit.
    pub fn insert(&self, toolkit: ToolkitId, caller: CallerId, credential: Credential) {
        self.per_caller.write().insert((toolkit, caller), credential);
    }

    /// Credential shared by every caller of a toolkit.
    pub fn insert_toolkit_wide(&self, toolkit: ToolkitId, credential: Credential) {
        self.toolkit_wide.write().insert(toolkit, credential);
    }

    pub fn remove_toolkit(&self, toolkit: &ToolkitId) {
        self.toolkit_wide.write().remove(toolkit);
        self.per_caller.write().retain(|(t, _), _| t != toolkit);
    }

    /// Number of `resolve` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(
        &self,
        toolkit: &ToolkitId,
        caller: &CallerId,
    ) -> Result<Credential, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let found = self
            .per_caller
            .read()
            .get(&(toolkit.clone(), caller.clone()))
            .cloned()
            .or_else(|| self.toolkit_wide.read().get(toolkit).cloned());

        match found {
            None => Err(CredentialError::NotFound {
                toolkit: toolkit.clone(),
                caller: caller.clone(),
            }),
            Some(cred) if cred.is_expired() => Err(CredentialError::Expired {
                toolkit: toolkit.clone(),
            }),
            Some(cred) => Ok(cred),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn ids() -> (ToolkitId, CallerId) {
        (
            ToolkitId::try_from("github").unwrap(),
            CallerId::try_from("user-1").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_caller_specific_wins() {
        let (toolkit, caller) = ids();
        let resolver = StaticCredentialResolver::new();
        resolver.insert_toolkit_wide(toolkit.clone(), Credential::new("shared"));
        resolver.insert(toolkit.clone(), caller.clone(), Credential::new("mine"));

        let cred = resolver.resolve(&toolkit, &caller).await.unwrap();
        assert_eq!(cred.secret(), "mine");

        let other = CallerId::try_from("user-2").unwrap();
        let cred = resolver.resolve(&toolkit, &other).await.unwrap();
        assert_eq!(cred.secret(), "shared");
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_and_expired() {
        let (toolkit, caller) = ids();
        let resolver = StaticCredentialResolver::new();
        assert!(matches!(
            resolver.resolve(&toolkit, &caller).await,
            Err(CredentialError::NotFound { .. })
        ));

        resolver.insert(
            toolkit.clone(),
            caller.clone(),
            Credential::new("old").with_expiry(Utc::now() - Duration::seconds(1)),
        );
        assert!(matches!(
            resolver.resolve(&toolkit, &caller).await,
            Err(CredentialError::Expired { .. })
        ));
    }
}
