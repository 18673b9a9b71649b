//! The persistence component
//!
//! [`CacheHelper`] owns one storage handle for its whole lifetime: it is
//! created by the async [`initialize`](CacheHelper::initialize) and never
//! re-opened. Every operation that touches the store runs under the
//! cross-process lock; the in-process side is guarded by a mutex on the
//! registration state. Lock ordering is fixed everywhere: cross-process
//! lock first, state mutex second.

use crate::cache::TokenCache;
use crate::config::{FallbackMode, StorageProperties};
use crc32c::crc32c;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokenvault_core::{BackendKind, PersistenceError, RecoveryHint, Result, SubscriptionId};
use tokenvault_storage::{CrossProcessLock, KeyringStore, ProtectedFileStore, SecureStore};
use zeroize::Zeroizing;

/// The six-operation persistence capability
///
/// Initialization is deliberately not part of the trait: a handle that
/// exists has already been initialized, so "operating before initialize"
/// cannot be expressed. Production code uses [`CacheHelper`]; caller unit
/// tests substitute [`crate::testing::InMemoryPersistence`].
pub trait CachePersistence: Send + Sync {
    /// Write → read → clear round trip against the real backend
    ///
    /// Confirms the platform actually persists and returns data unmodified,
    /// using a dedicated probe entry; the token-cache blob itself is never
    /// touched and the probe is cleared on success and on failure alike.
    fn verify_persistence(&self) -> Result<()>;

    /// Begin bidirectional synchronization with a caller-owned cache
    ///
    /// The persisted blob is merged into the cache immediately, then every
    /// change event the cache raises triggers a save. Only a weak reference
    /// is kept; registering an already-registered cache is a no-op.
    fn register_cache(&self, cache: &Arc<dyn TokenCache>);

    /// Stop synchronizing the given cache; no-op if it is not registered
    fn unregister_cache(&self, cache: &Arc<dyn TokenCache>);

    /// Read the current blob, bypassing registered caches
    ///
    /// The returned bytes are sensitive plaintext; they are wrapped in
    /// [`Zeroizing`] so the buffer is wiped when dropped. An empty buffer
    /// means nothing has been persisted yet.
    fn load_unencrypted_token_cache(&self) -> Result<Zeroizing<Vec<u8>>>;

    /// Persist the given blob, overwriting the previous value
    fn save_unencrypted_token_cache(&self, data: &[u8]) -> Result<()>;
}

struct Registration {
    key: usize,
    cache: Weak<dyn TokenCache>,
    subscription: SubscriptionId,
}

#[derive(Default)]
struct SyncState {
    registrations: Vec<Registration>,
    /// CRC of the blob as this component last saw it; used to detect
    /// writes by other processes before persisting a registered cache.
    last_seen_crc: Option<u32>,
}

struct HelperInner {
    props: StorageProperties,
    backend: BackendKind,
    store: Box<dyn SecureStore>,
    probe: Box<dyn SecureStore>,
    state: Mutex<SyncState>,
}

/// Production implementation of [`CachePersistence`]
pub struct CacheHelper {
    inner: Arc<HelperInner>,
}

impl CacheHelper {
    /// Open the secure storage backend described by `props`
    ///
    /// This is the only operation that blocks on setup I/O, and the only
    /// way to obtain a handle. Dropping the returned future abandons
    /// initialization. Side effects: the cache directory (and, on first
    /// save, the vault file or keyring entry) are created.
    pub async fn initialize(props: StorageProperties) -> Result<Self> {
        tokio::fs::create_dir_all(props.cache_directory())
            .await
            .map_err(|e| {
                PersistenceError::from_io(
                    BackendKind::ProtectedFile,
                    props.cache_directory(),
                    "create cache directory",
                    e,
                )
            })?;

        tokio::task::spawn_blocking(move || Self::open(props))
            .await
            .map_err(|e| PersistenceError::BackendUnavailable {
                backend: BackendKind::ProtectedFile,
                reason: format!("initialization task failed: {e}"),
                source: None,
                recovery_hint: RecoveryHint::Manual {
                    instructions: "Re-create the persistence component".to_string(),
                },
            })?
    }

    fn open(props: StorageProperties) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(
                props.cache_directory(),
                std::fs::Permissions::from_mode(0o700),
            );
        }

        let (backend, store, probe) = Self::select_backend(&props)?;
        tracing::debug!(%backend, store = %store.describe(), "persistence initialized");

        let inner = Arc::new(HelperInner {
            props,
            backend,
            store,
            probe,
            state: Mutex::new(SyncState::default()),
        });

        // Warm the fingerprint so the first change notification can tell
        // whether another process wrote in the meantime. Not fatal: a
        // corrupt or unreadable blob surfaces on the first real load.
        match inner.lock().and_then(|_guard| inner.store.read()) {
            Ok(Some(data)) => inner.state.lock().last_seen_crc = Some(crc32c(&data)),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "could not read existing blob during initialization"),
        }

        Ok(Self { inner })
    }

    /// Pick keyring or protected file according to the properties
    #[allow(clippy::type_complexity)]
    fn select_backend(
        props: &StorageProperties,
    ) -> Result<(BackendKind, Box<dyn SecureStore>, Box<dyn SecureStore>)> {
        if let Some((service, account)) = props.keyring_identity() {
            let store = KeyringStore::new(service, account);
            match store.read() {
                // A corrupt stored value still proves the keyring works.
                Ok(_) | Err(PersistenceError::Corrupt { .. }) => {
                    let probe_account = props
                        .probe_keyring_account()
                        .unwrap_or_else(|| format!("{account}.verify"));
                    let probe = KeyringStore::new(service, probe_account);
                    return Ok((BackendKind::Keyring, Box::new(store), Box::new(probe)));
                }
                Err(e) => match props.fallback() {
                    FallbackMode::Error => {
                        return Err(PersistenceError::BackendUnavailable {
                            backend: BackendKind::Keyring,
                            reason: format!("keyring backend unavailable: {e}"),
                            source: Some(Box::new(e)),
                            recovery_hint: RecoveryHint::NoFallbackConfigured,
                        });
                    }
                    FallbackMode::PlaintextFile => {
                        tracing::warn!(
                            error = %e,
                            "keyring unavailable; falling back to the protected file store, \
                             which does not encrypt the token cache"
                        );
                    }
                },
            }
        }

        let store = ProtectedFileStore::open(props.cache_path())?;
        let probe = ProtectedFileStore::open(props.probe_path())?;
        Ok((
            BackendKind::ProtectedFile,
            Box::new(store),
            Box::new(probe),
        ))
    }

    /// The backend this helper ended up using
    pub fn backend(&self) -> BackendKind {
        self.inner.backend
    }
}

impl HelperInner {
    fn lock(&self) -> Result<CrossProcessLock> {
        CrossProcessLock::acquire(
            &self.props.lock_path(),
            self.props.lock_retry_count(),
            self.props.lock_retry_delay(),
        )
    }

    /// Persist a registered cache after its change event fired
    fn persist_registered(&self, cache: &dyn TokenCache) -> Result<()> {
        let _guard = self.lock()?;

        // Another process may have written since we last touched the
        // store; hand its blob to the cache before serializing, so the
        // cache can merge rather than blindly overwrite.
        if let Some(external) = self.store.read()? {
            let external_crc = crc32c(&external);
            let stale = self.state.lock().last_seen_crc != Some(external_crc);
            if stale {
                cache.deserialize(&external);
            }
        }

        let data = Zeroizing::new(cache.serialize());
        self.store.write(&data)?;
        self.state.lock().last_seen_crc = Some(crc32c(&data));
        tracing::debug!(bytes = data.len(), "registered cache persisted");
        Ok(())
    }
}

impl CachePersistence for CacheHelper {
    fn verify_persistence(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.lock()?;

        let nonce: [u8; 32] = rand::random();
        let round_trip = (|| {
            inner.probe.write(&nonce)?;
            match inner.probe.read()? {
                Some(data) if data == nonce => Ok(()),
                Some(data) => Err(PersistenceError::IntegrityMismatch {
                    operation: "persistence probe",
                    expected: format!("{} bytes (crc {:08x})", nonce.len(), crc32c(&nonce)),
                    actual: format!("{} bytes (crc {:08x})", data.len(), crc32c(&data)),
                    recovery_hint: RecoveryHint::ClearAndRetry,
                }),
                None => Err(PersistenceError::IntegrityMismatch {
                    operation: "persistence probe",
                    expected: format!("{} bytes (crc {:08x})", nonce.len(), crc32c(&nonce)),
                    actual: "no data returned".to_string(),
                    recovery_hint: RecoveryHint::ClearAndRetry,
                }),
            }
        })();

        // The probe must leave no residue whichever way the round trip went.
        let cleanup = inner.probe.clear();
        round_trip.and(cleanup)
    }

    fn register_cache(&self, cache: &Arc<dyn TokenCache>) {
        let key = registration_key(cache);

        {
            let mut state = self.inner.state.lock();
            state.registrations.retain(|r| r.cache.strong_count() > 0);
            if state.registrations.iter().any(|r| r.key == key) {
                return;
            }
        }

        // Preload outside the state mutex; the cross-process lock always
        // comes first in the lock order.
        let preload = match self.inner.lock().and_then(|_guard| self.inner.store.read()) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "could not preload persisted blob during registration");
                None
            }
        };
        if let Some(data) = &preload {
            cache.deserialize(data);
        }

        let weak_inner = Arc::downgrade(&self.inner);
        let weak_cache = Arc::downgrade(cache);
        let subscription = cache.changed().subscribe(Box::new(move || {
            if let (Some(inner), Some(cache)) = (weak_inner.upgrade(), weak_cache.upgrade()) {
                if let Err(e) = inner.persist_registered(cache.as_ref()) {
                    tracing::error!(error = %e, "failed to persist registered cache after change");
                }
            }
        }));

        let mut state = self.inner.state.lock();
        if state.registrations.iter().any(|r| r.key == key) {
            // Lost a registration race; keep the first subscription.
            drop(state);
            cache.changed().unsubscribe(subscription);
            return;
        }
        if let Some(data) = &preload {
            state.last_seen_crc = Some(crc32c(data));
        }
        state.registrations.push(Registration {
            key,
            cache: Arc::downgrade(cache),
            subscription,
        });
    }

    fn unregister_cache(&self, cache: &Arc<dyn TokenCache>) {
        let key = registration_key(cache);

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
        let inner = &self.inner;
        let _guard = inner.lock()?;

        let data = inner.store.read()?;
        if let Some(data) = &data {
            inner.state.lock().last_seen_crc = Some(crc32c(data));
        }
        Ok(Zeroizing::new(data.unwrap_or_default()))
    }

    fn save_unencrypted_token_cache(&self, data: &[u8]) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.lock()?;

        inner.store.write(data)?;
        inner.state.lock().last_seen_crc = Some(crc32c(data));
        Ok(())
    }
}

impl fmt::Debug for CacheHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHelper")
            .field("backend", &self.inner.backend)
            .field("store", &self.inner.store.describe())
            .field(
                "registrations",
                &self.inner.state.lock().registrations.len(),
            )
            .finish()
    }
}

fn registration_key(cache: &Arc<dyn TokenCache>) -> usize {
    Arc::as_ptr(cache) as *const () as usize
}
