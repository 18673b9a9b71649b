//! Token-cache persistence
//!
//! This crate owns the public surface of tokenvault: configure where and
//! how a serialized token cache is persisted ([`StorageProperties`]), open
//! the backend once ([`CacheHelper::initialize`]), then either register
//! in-memory caches for automatic synchronization or move raw blobs in and
//! out directly. Production code talks to [`CacheHelper`]; unit tests of
//! callers substitute [`testing::InMemoryPersistence`] behind the
//! [`CachePersistence`] trait.

pub mod cache;
pub mod config;
pub mod helper;
pub mod testing;

pub use cache::TokenCache;
pub use config::{FallbackMode, InvalidProperties, StorageProperties, StoragePropertiesBuilder};
pub use helper::{CacheHelper, CachePersistence};
