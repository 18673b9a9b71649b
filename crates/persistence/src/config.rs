//! Storage configuration with validation
//!
//! `StorageProperties` is built once by the caller, validated at build
//! time, and read-only afterward. It decides which backend the helper
//! opens (keyring when a service/account pair is set, the protected file
//! otherwise), where the vault and its lock file live, and how patiently
//! the cross-process lock is acquired.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default lock acquisition attempts
const DEFAULT_LOCK_RETRY_COUNT: u32 = 60;

/// Default delay between lock acquisition attempts
const DEFAULT_LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Policy when the preferred keyring backend is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Fail initialization loudly; never persist less securely than asked
    Error,
    /// Fall back to the protected file store, which guarantees integrity
    /// but not confidentiality, and log a warning
    PlaintextFile,
}

/// Immutable description of where and how the token cache is persisted
#[derive(Debug, Clone)]
pub struct StorageProperties {
    cache_file_name: String,
    cache_directory: PathBuf,
    keyring_service: Option<String>,
    keyring_account: Option<String>,
    fallback: FallbackMode,
    lock_retry_count: u32,
    lock_retry_delay: Duration,
}

impl StorageProperties {
    /// Start building properties for the given vault file name
    pub fn builder(cache_file_name: impl Into<String>) -> StoragePropertiesBuilder {
        StoragePropertiesBuilder {
            cache_file_name: cache_file_name.into(),
            cache_directory: None,
            keyring_service: None,
            keyring_account: None,
            fallback: FallbackMode::Error,
            lock_retry_count: DEFAULT_LOCK_RETRY_COUNT,
            lock_retry_delay: DEFAULT_LOCK_RETRY_DELAY,
        }
    }

    pub fn cache_directory(&self) -> &PathBuf {
        &self.cache_directory
    }

    /// Full path of the vault file
    pub fn cache_path(&self) -> PathBuf {
        self.cache_directory.join(&self.cache_file_name)
    }

    /// Path of the advisory lock file guarding the vault
    pub fn lock_path(&self) -> PathBuf {
        self.cache_directory
            .join(format!("{}.lockfile", self.cache_file_name))
    }

    /// Path of the round-trip verification probe file
    pub fn probe_path(&self) -> PathBuf {
        self.cache_directory
            .join(format!("{}.verify", self.cache_file_name))
    }

    /// Keyring service/account pair, when the keyring backend is requested
    pub fn keyring_identity(&self) -> Option<(&str, &str)> {
        match (&self.keyring_service, &self.keyring_account) {
            (Some(service), Some(account)) => Some((service, account)),
            _ => None,
        }
    }

    /// Account name used for the keyring verification probe entry
    pub fn probe_keyring_account(&self) -> Option<String> {
        self.keyring_account
            .as_ref()
            .map(|account| format!("{account}.verify"))
    }

    pub fn fallback(&self) -> FallbackMode {
        self.fallback
    }

    pub fn lock_retry_count(&self) -> u32 {
        self.lock_retry_count
    }

    pub fn lock_retry_delay(&self) -> Duration {
        self.lock_retry_delay
    }
}

/// Builder for [`StorageProperties`]
#[derive(Debug)]
pub struct StoragePropertiesBuilder {
    cache_file_name: String,
    cache_directory: Option<PathBuf>,
    keyring_service: Option<String>,
    keyring_account: Option<String>,
    fallback: FallbackMode,
    lock_retry_count: u32,
    lock_retry_delay: Duration,
}

impl StoragePropertiesBuilder {
    /// Directory the vault and lock files live in; defaults to a
    /// `tokenvault` subdirectory of the user cache directory
    pub fn cache_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_directory = Some(dir.into());
        self
    }

    /// Prefer the OS keyring, stored under the given service and account
    pub fn keyring(mut self, service: impl Into<String>, account: impl Into<String>) -> Self {
        self.keyring_service = Some(service.into());
        self.keyring_account = Some(account.into());
        self
    }

    /// Policy when the keyring backend is unavailable
    pub fn fallback(mut self, fallback: FallbackMode) -> Self {
        self.fallback = fallback;
        self
    }

    /// Cross-process lock acquisition budget
    pub fn lock_retry(mut self, count: u32, delay: Duration) -> Self {
        self.lock_retry_count = count;
        self.lock_retry_delay = delay;
        self
    }

    /// Validate and freeze the properties
    pub fn build(self) -> Result<StorageProperties, InvalidProperties> {
        if self.cache_file_name.is_empty() {
            return Err(InvalidProperties {
                field: "cache_file_name",
                reason: "must not be empty".to_string(),
            });
        }

        if self.cache_file_name.contains(['/', '\\']) || self.cache_file_name.contains("..") {
            return Err(InvalidProperties {
                field: "cache_file_name",
                reason: "must be a bare file name without path components".to_string(),
            });
        }

        if let Some(service) = &self.keyring_service {
            if service.is_empty() {
                return Err(InvalidProperties {
                    field: "keyring_service",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if let Some(account) = &self.keyring_account {
            if account.is_empty() {
                return Err(InvalidProperties {
                    field: "keyring_account",
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if self.lock_retry_count == 0 {
            return Err(InvalidProperties {
                field: "lock_retry_count",
                reason: "at least one acquisition attempt is required".to_string(),
            });
        }

        let cache_directory = self.cache_directory.unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("tokenvault")
        });

        Ok(StorageProperties {
            cache_file_name: self.cache_file_name,
            cache_directory,
            keyring_service: self.keyring_service,
            keyring_account: self.keyring_account,
            fallback: self.fallback,
            lock_retry_count: self.lock_retry_count,
            lock_retry_delay: self.lock_retry_delay,
        })
    }
}

/// Rejected storage properties
///
/// A build-time validation failure is caller misuse, not a backend
/// condition, so it sits outside the `PersistenceError` taxonomy.
#[derive(Debug)]
pub struct InvalidProperties {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for InvalidProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid storage properties: {}: {}", self.field, self.reason)
    }
}

impl std::error::Error for InvalidProperties {}
