//! Display implementations for persistence errors

use super::types::{BackendKind, PersistenceError};
use std::fmt;

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyring => write!(f, "OS keyring"),
            Self::ProtectedFile => write!(f, "protected file"),
            Self::InMemory => write!(f, "in-memory store"),
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendUnavailable {
                backend, reason, ..
            } => write!(f, "{backend} unavailable: {reason}"),
            Self::AccessDenied {
                identifier,
                operation,
                ..
            } => write!(f, "Access denied during {operation} on '{identifier}'"),
            Self::IntegrityMismatch {
                operation,
                expected,
                actual,
                ..
            } => write!(
                f,
                "Integrity mismatch during {operation}: expected {expected}, got {actual}"
            ),
            Self::Corrupt {
                identifier, reason, ..
            } => write!(f, "Persisted blob at '{identifier}' is corrupt: {reason}"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BackendUnavailable {
                source: Some(source),
                ..
            }
            | Self::AccessDenied {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            _ => None,
        }
    }
}
