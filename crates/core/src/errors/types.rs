//! Core error types for the persistence system

use std::path::PathBuf;
use std::time::Duration;

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// The storage backend a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// OS credential manager / keyring
    Keyring,
    /// Integrity-framed file in the cache directory
    ProtectedFile,
    /// In-process store (test double)
    InMemory,
}

/// Error type for all persistence operations
///
/// The taxonomy is deliberately small: callers distinguish "the backend is
/// not there", "the backend refused us", "the backend lied on a round trip"
/// and "the stored blob is unreadable". Everything else is context.
#[derive(Debug)]
pub enum PersistenceError {
    /// The secure storage backend cannot be reached or used
    BackendUnavailable {
        backend: BackendKind,
        reason: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        recovery_hint: RecoveryHint,
    },

    /// The backend exists but refused the operation
    AccessDenied {
        identifier: String,
        operation: &'static str,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        recovery_hint: RecoveryHint,
    },

    /// A write-then-read round trip did not return what was written
    IntegrityMismatch {
        operation: &'static str,
        expected: String,
        actual: String,
        recovery_hint: RecoveryHint,
    },

    /// The persisted blob is unreadable or undecodable
    Corrupt {
        identifier: String,
        reason: String,
        recovery_hint: RecoveryHint,
    },
}

/// Recovery hints attached to every persistence error
#[derive(Debug, Clone)]
pub enum RecoveryHint {
    /// Retry the operation after a delay
    Retry { after: Duration },

    /// Check file or store permissions
    CheckPermissions { path: PathBuf },

    /// Clear the persisted blob and retry
    ClearAndRetry,

    /// The preferred backend failed and no fallback policy allows another
    NoFallbackConfigured,

    /// No automated recovery possible
    Manual { instructions: String },
}
