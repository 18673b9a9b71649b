//! Error types for token-cache persistence
//!
//! Every backend failure surfaces as one of four `PersistenceError` kinds,
//! each carrying the underlying platform error as context plus a recovery
//! hint. No operation in this workspace retries; retry policy belongs to
//! the caller.

mod conversions;
mod display;
mod recovery;
mod types;

pub use types::*;
