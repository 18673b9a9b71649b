//! Core types for the tokenvault persistence system
//!
//! This crate carries the pieces shared by every other tokenvault crate:
//! the persistence error taxonomy with operational recovery hints, and the
//! change-event primitive that registered token caches raise on mutation.

pub mod errors;
pub mod events;

pub use errors::{BackendKind, PersistenceError, RecoveryHint, Result};
pub use events::{ChangeEvent, SubscriptionId};
