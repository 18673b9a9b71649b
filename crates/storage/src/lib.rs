//! Secure storage backends for token-cache persistence
//!
//! This crate provides the [`SecureStore`] capability seam plus the two
//! production drivers behind it: an integrity-framed file store and an OS
//! keyring store. It also provides the cross-process lock that serializes
//! read-modify-write sequences against a store shared between processes.

pub mod file;
pub mod keyring_store;
pub mod lock;
pub mod store;

pub use file::ProtectedFileStore;
pub use keyring_store::KeyringStore;
pub use lock::CrossProcessLock;
pub use store::SecureStore;
