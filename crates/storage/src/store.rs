//! The secure-store capability trait

use tokenvault_core::Result;

/// A backend that can durably hold one opaque blob
///
/// Implementations never fabricate data: a store that has never been
/// written reads as `None`, and a store whose content fails validation
/// surfaces `Corrupt` rather than returning partial bytes.
pub trait SecureStore: Send + Sync {
    /// Read the current blob, or `None` if nothing has ever been written
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Atomically overwrite the blob
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Remove the blob; succeeds if it was already absent
    fn clear(&self) -> Result<()>;

    /// Human-readable identifier for diagnostics and error context
    fn describe(&self) -> String;
}
