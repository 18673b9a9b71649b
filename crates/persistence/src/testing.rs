//! Test doubles for the persistence capability
//!
//! `InMemoryPersistence` stands in for [`CacheHelper`](crate::CacheHelper)
//! behind [`CachePersistence`](crate::CachePersistence) in caller unit
//! tests, and `BufferTokenCache` is a minimal [`TokenCache`] whose contents
//! are a plain byte buffer.

use crate::cache::TokenCache;
use crate::helper::CachePersistence;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokenvault_core::{
    BackendKind, ChangeEvent, PersistenceError, RecoveryHint, Result, SubscriptionId,
};
use zeroize::Zeroizing;

/// A token cache over a plain byte buffer
///
/// [`set`](BufferTokenCache::set) models a local mutation and raises the
/// change event; `deserialize` replaces the buffer silently, as the
/// contract requires.
#[derive(Default)]
pub struct BufferTokenCache {
    data: Mutex<Vec<u8>>,
    changed: ChangeEvent,
}

impl BufferTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents and raise the change event
    pub fn set(&self, data: &[u8]) {
        *self.data.lock() = data.to_vec();
        self.changed.notify();
    }

    /// Current contents
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl TokenCache for BufferTokenCache {
    fn serialize(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn deserialize(&self, data: &[u8]) {
        *self.data.lock() = data.to_vec();
    }

    fn changed(&self) -> &ChangeEvent {
        &self.changed
    }
}

struct MemRegistration {
    key: usize,
    cache: Weak<dyn TokenCache>,
    subscription: SubscriptionId,
}

#[derive(Default)]
struct MemState {
    blob: Option<Vec<u8>>,
    registrations: Vec<MemRegistration>,
}

#[derive(Default)]
struct MemInner {
    state: Mutex<MemState>,
    fail_verification: AtomicBool,
}

impl MemInner {
    fn persist_registered(&self, cache: &dyn TokenCache) {
        self.state.lock().blob = Some(cache.serialize());
    }
}

/// In-process implementation of the full persistence contract
#[derive(Default)]
pub struct InMemoryPersistence {
    inner: Arc<MemInner>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `verify_persistence` calls fail
    pub fn fail_verification(&self, fail: bool) {
        self.inner.fail_verification.store(fail, Ordering::SeqCst);
    }
}

impl CachePersistence for InMemoryPersistence {
    fn verify_persistence(&self) -> Result<()> {
        if self.inner.fail_verification.load(Ordering::SeqCst) {
            return Err(PersistenceError::BackendUnavailable {
                backend: BackendKind::InMemory,
                reason: "verification failure injected by test".to_string(),
                source: None,
                recovery_hint: RecoveryHint::Manual {
                    instructions: "This is a test double".to_string(),
                },
            });
        }
        Ok(())
    }

    fn register_cache(&self, cache: &Arc<dyn TokenCache>) {
        let key = Arc::as_ptr(cache) as *const () as usize;

        let mut state = self.inner.state.lock();
        state.registrations.retain(|r| r.cache.strong_count() > 0);
        if state.registrations.iter().any(|r| r.key == key) {
            return;
        }

        if let Some(blob) = &state.blob {
            cache.deserialize(blob);
        }

        let weak_inner = Arc::downgrade(&self.inner);
        let weak_cache = Arc::downgrade(cache);
        let subscription = cache.changed().subscribe(Box::new(move || {
            if let (Some(inner), Some(cache)) = (weak_inner.upgrade(), weak_cache.upgrade()) {
                inner.persist_registered(cache.as_ref());
            }
        }));

        state.registrations.push(MemRegistration {
            key,
            cache: Arc::downgrade(cache),
            subscription,
        });
    }

    fn unregister_cache(&self, cache: &Arc<dyn TokenCache>) {
        let key = Arc::as_ptr(cache) as *const () as usize;

        let removed = {
            let mut state = self.inner.state.lock();
            state
                .registrations
                .iter()
                .position(|r| r.key == key)
                .map(|pos| state.registrations.remove(pos))
        };

        if let Some(registration) = removed {
            cache.changed().unsubscribe(registration.subscription);
        }
    }

    fn load_unencrypted_token_cache(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(
            self.inner.state.lock().blob.clone().unwrap_or_default(),
        ))
    }

    fn save_unencrypted_token_cache(&self, data: &[u8]) -> Result<()> {
        self.inner.state.lock().blob = Some(data.to_vec());
        Ok(())
    }
}
