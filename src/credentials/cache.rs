//! Single-flight credential cache.
//!
//! Each `(toolkit, caller)` key owns an async slot. The first caller to take
//! the slot resolves; concurrent callers for the same key wait on the slot and
//! then read the cached credential instead of resolving again. Failures are
//! never cached, and a failed resolve drops its slot. Once the map holds
//! `SWEEP_THRESHOLD` slots, idle slots without a fresh credential are swept
//! before a new key is added.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Credential, CredentialError, CredentialResolver};
use crate::types::{CallerId, CredentialCacheConfig, ToolkitId};

type Key = (ToolkitId, CallerId);
type Slot = Arc<tokio::sync::Mutex<Option<CachedCredential>>>;

const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct CachedCredential {
    credential: Credential,
    cached_at: Instant,
}

impl CachedCredential {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl && !self.credential.is_expired()
    }
}

/// Wraps a resolver with a TTL cache and per-key single-flight.
#[derive(Debug)]
pub struct CachingResolver<R> {
    inner: R,
    ttl: Duration,
    slots: Mutex<HashMap<Key, Slot>>,
}

impl<R: CredentialResolver> CachingResolver<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(inner: R, config: &CredentialCacheConfig) -> Self {
        Self::new(inner, config.ttl)
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn slot(&self, key: Key) -> Slot {
        let mut slots = self.slots.lock();
        if slots.len() >= SWEEP_THRESHOLD && !slots.contains_key(&key) {
            let ttl = self.ttl;
            let before = slots.len();
            // A slot that is locked has a resolve in flight.
            slots.retain(|_, slot| match slot.try_lock() {
                Ok(entry) => entry.as_ref().is_some_and(|e| e.is_fresh(ttl)),
                Err(_) => true,
            });
            tracing::debug!(
                swept = before - slots.len(),
                kept = slots.len(),
                "credential cache sweep"
            );
        }
        slots.entry(key).or_default().clone()
    }

    /// Remove `slot` unless it was already replaced.
    fn forget(&self, key: &Key, slot: &Slot) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }
}

#[async_trait]
impl<R: CredentialResolver> CredentialResolver for CachingResolver<R> {
    async fn resolve(
        &self,
        toolkit: &ToolkitId,
        caller: &CallerId,
    ) -> Result<Credential, CredentialError> {
        let key = (toolkit.clone(), caller.clone());
        let slot = self.slot(key.clone());
        let mut cached = slot.lock().await;

        if let Some(entry) = cached.as_ref() {
            if entry.is_fresh(self.ttl) {
                tracing::trace!(toolkit = %toolkit, caller = %caller, "credential cache hit");
                return Ok(entry.credential.clone());
            }
        }
        *cached = None;

        tracing::debug!(toolkit = %toolkit, caller = %caller, "resolving credential");
        let resolved = match self.inner.resolve(toolkit, caller).await {
            Ok(credential) if credential.is_expired() => Err(CredentialError::Expired {
                toolkit: toolkit.clone(),
            }),
            other => other,
        };

        match resolved {
            Ok(credential) => {
                *cached = Some(CachedCredential {
                    credential: credential.clone(),
                    cached_at: Instant::now(),
                });
                Ok(credential)
            }
            Err(err) => {
                drop(cached);
                self.forget(&key, &slot);
                Err(err)
            }
        }
    }

    fn invalidate(&self, toolkit: &ToolkitId, caller: &CallerId) {
        // Dropping the slot is enough: a resolve in flight finishes on the
        // old slot and the next call starts a fresh one.
        self.slots.lock().remove(&(toolkit.clone(), caller.clone()));
        self.inner.invalidate(toolkit, caller);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialResolver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ids() -> (ToolkitId, CallerId) {
        (
            ToolkitId::try_from("github").unwrap(),
            CallerId::try_from("user-1").unwrap(),
        )
    }

    /// Resolver that takes a while, to make concurrent callers overlap.
    #[derive(Debug, Default)]
    struct SlowResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialResolver for SlowResolver {
        async fn resolve(
            &self,
            _toolkit: &ToolkitId,
            _caller: &CallerId,
        ) -> Result<Credential, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Credential::new("token"))
        }
    }

    #[tokio::test]
    async fn test_single_flight_under_concurrency() {
        let (toolkit, caller) = ids();
        let cache = Arc::new(CachingResolver::new(SlowResolver::default(), Duration::from_secs(60)));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let toolkit = toolkit.clone();
                let caller = caller.clone();
                tokio::spawn(async move { cache.resolve(&toolkit, &caller).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().secret(), "token");
        }
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let (toolkit, caller) = ids();
        let cache = CachingResolver::new(StaticCredentialResolver::new(), Duration::from_secs(60));

        assert!(cache.resolve(&toolkit, &caller).await.is_err());
        cache
            .inner()
            .insert(toolkit.clone(), caller.clone(), Credential::new("late"));
        assert_eq!(cache.resolve(&toolkit, &caller).await.unwrap().secret(), "late");
        assert_eq!(cache.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_resolves_leave_no_slots() {
        let toolkit = ToolkitId::try_from("github").unwrap();
        let cache = CachingResolver::new(StaticCredentialResolver::new(), Duration::from_secs(60));

        for i in 0..1000 {
            let caller = CallerId::try_from(format!("user-{}", i)).unwrap();
            assert!(cache.resolve(&toolkit, &caller).await.is_err());
        }
        assert_eq!(cache.slot_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_credential_drops_slot() {
        let (toolkit, caller) = ids();
        let inner = StaticCredentialResolver::new();
        inner.insert(
            toolkit.clone(),
            caller.clone(),
            Credential::new("old").with_expiry(chrono::Utc::now() - chrono::Duration::minutes(1)),
        );
        let cache = CachingResolver::new(inner, Duration::from_secs(60));

        assert!(matches!(
            cache.resolve(&toolkit, &caller).await,
            Err(CredentialError::Expired { .. })
        ));
        assert_eq!(cache.slot_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_slots_swept_past_threshold() {
        let toolkit = ToolkitId::try_from("github").unwrap();
        let inner = StaticCredentialResolver::new();
        inner.insert_toolkit_wide(toolkit.clone(), Credential::new("shared"));
        let cache = CachingResolver::new(inner, Duration::from_millis(5));

        for i in 0..SWEEP_THRESHOLD {
            let caller = CallerId::try_from(format!("user-{}", i)).unwrap();
            cache.resolve(&toolkit, &caller).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let newcomer = CallerId::try_from("newcomer").unwrap();
        cache.resolve(&toolkit, &newcomer).await.unwrap();
        assert_eq!(cache.slot_count(), 1);
    }

    #[tokio::test]
    async fn test_fresh_slots_survive_sweep() {
        let toolkit = ToolkitId::try_from("github").unwrap();
        let inner = StaticCredentialResolver::new();
        inner.insert_toolkit_wide(toolkit.clone(), Credential::new("shared"));
        let cache = CachingResolver::new(inner, Duration::from_secs(60));

        for i in 0..=SWEEP_THRESHOLD {
            let caller = CallerId::try_from(format!("user-{}", i)).unwrap();
            cache.resolve(&toolkit, &caller).await.unwrap();
        }
        assert_eq!(cache.slot_count(), SWEEP_THRESHOLD + 1);
        assert_eq!(cache.inner().calls(), SWEEP_THRESHOLD + 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_and_invalidate() {
        let (toolkit, caller) = ids();
        let inner = StaticCredentialResolver::new();
        inner.insert(toolkit.clone(), caller.clone(), Credential::new("v1"));
        let cache = CachingResolver::new(inner, Duration::from_millis(20));

        cache.resolve(&toolkit, &caller).await.unwrap();
        cache.resolve(&toolkit, &caller).await.unwrap();
        assert_eq!(cache.inner().calls(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.resolve(&toolkit, &caller).await.unwrap();
        assert_eq!(cache.inner().calls(), 2);

        cache.invalidate(&toolkit, &caller);
        cache.resolve(&toolkit, &caller).await.unwrap();
        assert_eq!(cache.inner().calls(), 3);
    }
}
