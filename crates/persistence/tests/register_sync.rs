//! Bidirectional synchronization of registered caches

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokenvault_persistence::testing::BufferTokenCache;
use tokenvault_persistence::{CacheHelper, CachePersistence, StorageProperties, TokenCache};

fn props_in(dir: &Path) -> StorageProperties {
    StorageProperties::builder("msal.cache")
        .cache_directory(dir)
        .lock_retry(50, Duration::from_millis(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn mutation_persists_after_registration() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    let cache = Arc::new(BufferTokenCache::new());
    let as_dyn: Arc<dyn TokenCache> = cache.clone();
    helper.register_cache(&as_dyn);

    cache.set(b"freshly acquired tokens");

    assert_eq!(
        &*helper.load_unencrypted_token_cache().unwrap(),
        b"freshly acquired tokens"
    );
}

#[tokio::test]
async fn unregistered_cache_no_longer_persists() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    let cache = Arc::new(BufferTokenCache::new());
    let as_dyn: Arc<dyn TokenCache> = cache.clone();
    helper.register_cache(&as_dyn);

    cache.set(b"persisted");
    helper.unregister_cache(&as_dyn);
    cache.set(b"local only");

    assert_eq!(
        &*helper.load_unencrypted_token_cache().unwrap(),
        b"persisted"
    );
    assert_eq!(cache.changed().listener_count(), 0);
}

#[tokio::test]
async fn unregistering_an_unknown_cache_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    let cache: Arc<dyn TokenCache> = Arc::new(BufferTokenCache::new());
    helper.unregister_cache(&cache);
}

#[tokio::test]
async fn registering_twice_subscribes_once() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    let cache = Arc::new(BufferTokenCache::new());
    let as_dyn: Arc<dyn TokenCache> = cache.clone();
    helper.register_cache(&as_dyn);
    helper.register_cache(&as_dyn);

    assert_eq!(cache.changed().listener_count(), 1);
}

#[tokio::test]
async fn persisted_state_preloads_into_a_newly_registered_cache() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    helper
        .save_unencrypted_token_cache(b"state from a previous session")
        .unwrap();

    let cache = Arc::new(BufferTokenCache::new());
    let as_dyn: Arc<dyn TokenCache> = cache.clone();
    helper.register_cache(&as_dyn);

    assert_eq!(cache.contents(), b"state from a previous session");
}

#[tokio::test]
async fn multiple_distinct_caches_synchronize_independently() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    let first = Arc::new(BufferTokenCache::new());
    let second = Arc::new(BufferTokenCache::new());
    let first_dyn: Arc<dyn TokenCache> = first.clone();
    let second_dyn: Arc<dyn TokenCache> = second.clone();

    helper.register_cache(&first_dyn);
    helper.register_cache(&second_dyn);

    first.set(b"from the first cache");
    assert_eq!(
        &*helper.load_unencrypted_token_cache().unwrap(),
        b"from the first cache"
    );

    second.set(b"from the second cache");
    assert_eq!(
        &*helper.load_unencrypted_token_cache().unwrap(),
        b"from the second cache"
    );
}

#[tokio::test]
async fn dropped_cache_is_pruned_without_blocking_the_helper() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    {
        let cache = Arc::new(BufferTokenCache::new());
        let as_dyn: Arc<dyn TokenCache> = cache.clone();
        helper.register_cache(&as_dyn);
        cache.set(b"short lived");
    }

    // The helper held only weak references; the cache is gone and raw
    // operations keep working.
    helper.save_unencrypted_token_cache(b"after drop").unwrap();
    assert_eq!(
        &*helper.load_unencrypted_token_cache().unwrap(),
        b"after drop"
    );

    let replacement = Arc::new(BufferTokenCache::new());
    let as_dyn: Arc<dyn TokenCache> = replacement.clone();
    helper.register_cache(&as_dyn);
    replacement.set(b"replacement");
    assert_eq!(
        &*helper.load_unencrypted_token_cache().unwrap(),
        b"replacement"
    );
}
