//! Round-trip verification probe behavior

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokenvault_persistence::{CacheHelper, CachePersistence, StorageProperties};

fn props_in(dir: &Path) -> StorageProperties {
    StorageProperties::builder("msal.cache")
        .cache_directory(dir)
        .lock_retry(50, Duration::from_millis(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn verify_succeeds_on_a_working_backend() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    helper.verify_persistence().unwrap();
}

#[tokio::test]
async fn verify_leaves_no_residue_and_never_touches_the_blob() {
    let dir = TempDir::new().unwrap();
    let props = props_in(dir.path());
    let helper = CacheHelper::initialize(props.clone()).await.unwrap();

    helper.save_unencrypted_token_cache(b"precious tokens").unwrap();
    let before = std::fs::read(props.cache_path()).unwrap();

    helper.verify_persistence().unwrap();

    assert!(!props.probe_path().exists(), "probe file left behind");
    let after = std::fs::read(props.cache_path()).unwrap();
    assert_eq!(before, after, "verification modified the token cache");
}

#[tokio::test]
async fn verify_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let helper = CacheHelper::initialize(props_in(dir.path())).await.unwrap();

    assert!(helper.verify_persistence().is_ok());
    assert!(helper.verify_persistence().is_ok());
}

#[tokio::test]
async fn verify_fails_when_the_backend_disappears() {
    let dir = TempDir::new().unwrap();
    let vault_dir = dir.path().join("vault");
    let helper = CacheHelper::initialize(props_in(&vault_dir)).await.unwrap();

    std::fs::remove_dir_all(&vault_dir).unwrap();

    let err = helper.verify_persistence().unwrap_err();
    assert!(
        matches!(
            err,
            tokenvault_core::PersistenceError::BackendUnavailable { .. }
                | tokenvault_core::PersistenceError::AccessDenied { .. }
        ),
        "unexpected error: {err:?}"
    );
}
