//! Recovery utilities for persistence errors

use super::types::{PersistenceError, RecoveryHint};

impl PersistenceError {
    /// Get the recovery hint for this error
    #[must_use]
    pub const fn recovery_hint(&self) -> &RecoveryHint {
        match self {
            Self::BackendUnavailable { recovery_hint, .. }
            | Self::AccessDenied { recovery_hint, .. }
            | Self::IntegrityMismatch { recovery_hint, .. }
            | Self::Corrupt { recovery_hint, .. } => recovery_hint,
        }
    }

    /// Check if this error is transient and a caller may retry
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.recovery_hint(), RecoveryHint::Retry { .. })
    }

    /// Check if this error indicates unreadable persisted data
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. } | Self::IntegrityMismatch { .. }
        )
    }
}
