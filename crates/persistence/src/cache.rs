//! The caller-supplied token-cache capability

use tokenvault_core::ChangeEvent;

/// An in-memory token cache that can be kept in sync with the store
///
/// The blob format is entirely the cache's business; persistence moves it
/// around verbatim. Implementations own the merge semantics of
/// [`deserialize`](TokenCache::deserialize).
pub trait TokenCache: Send + Sync {
    /// Serialize the full cache contents
    fn serialize(&self) -> Vec<u8>;

    /// Merge previously serialized contents into this cache
    ///
    /// Must not raise [`changed`](TokenCache::changed): this is the path by
    /// which persisted state flows *into* the cache, and re-raising the
    /// event would feed the synchronization loop back on itself.
    fn deserialize(&self, data: &[u8]);

    /// The event this cache raises after a local mutation
    fn changed(&self) -> &ChangeEvent;
}
