//! Error conversion utilities

use super::types::{BackendKind, PersistenceError, RecoveryHint};
use std::path::Path;
use std::time::Duration;

impl PersistenceError {
    /// Map an I/O error from a backend operation into the taxonomy
    ///
    /// Permission problems become `AccessDenied`; everything else means the
    /// backend cannot currently be used.
    pub fn from_io(
        backend: BackendKind,
        path: &Path,
        operation: &'static str,
        error: std::io::Error,
    ) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => Self::AccessDenied {
                identifier: path.display().to_string(),
                operation,
                source: Some(Box::new(error)),
                recovery_hint: RecoveryHint::CheckPermissions {
                    path: path.to_path_buf(),
                },
            },
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Self::BackendUnavailable {
                backend,
                reason: format!("{operation} on '{}': {error}", path.display()),
                source: Some(Box::new(error)),
                recovery_hint: RecoveryHint::Retry {
                    after: Duration::from_millis(100),
                },
            },
            _ => Self::BackendUnavailable {
                backend,
                reason: format!("{operation} on '{}': {error}", path.display()),
                source: Some(Box::new(error)),
                recovery_hint: RecoveryHint::CheckPermissions {
                    path: path.to_path_buf(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_maps_to_access_denied() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let mapped = PersistenceError::from_io(
            BackendKind::ProtectedFile,
            Path::new("/tmp/cache.bin"),
            "write blob",
            err,
        );
        assert!(matches!(mapped, PersistenceError::AccessDenied { .. }));
        assert!(matches!(
            mapped.recovery_hint(),
            RecoveryHint::CheckPermissions { .. }
        ));
    }

    #[test]
    fn other_io_errors_map_to_backend_unavailable() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let mapped = PersistenceError::from_io(
            BackendKind::ProtectedFile,
            Path::new("/tmp/cache.bin"),
            "read blob",
            err,
        );
        assert!(matches!(
            mapped,
            PersistenceError::BackendUnavailable { .. }
        ));
        assert!(!mapped.is_corruption());
    }

    #[test]
    fn would_block_is_transient() {
        let err = std::io::Error::new(std::io::ErrorKind::WouldBlock, "busy");
        let mapped = PersistenceError::from_io(
            BackendKind::ProtectedFile,
            Path::new("/tmp/cache.bin"),
            "lock",
            err,
        );
        assert!(mapped.is_transient());
    }
}
