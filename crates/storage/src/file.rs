//! Integrity-framed file store
//!
//! The fallback backend when no OS keyring is configured or available. The
//! blob is framed by a fixed binary header carrying magic, format version
//! and CRC32C checksums over both the header and the payload, so any
//! tampering or torn write is detected on read instead of leaking partial
//! data. Writes go through a uniquely named temp file followed by a rename,
//! which keeps concurrent readers from ever observing an interleaved blob.

use crate::store::SecureStore;
use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokenvault_core::{BackendKind, PersistenceError, RecoveryHint, Result};

/// Magic number for vault files: "TVLT"
const VAULT_MAGIC: u32 = 0x5456_4C54;

/// Current storage format version
const STORAGE_VERSION: u16 = 1;

/// Binary header preceding the payload in every vault file
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct VaultHeader {
    /// Magic number for validation
    magic: u32,
    /// Storage format version
    version: u16,
    /// Reserved flag bits
    flags: u16,
    /// CRC32C of the header (excluding this field)
    header_crc: u32,
    /// Timestamp when written
    timestamp: u64,
    /// Payload size in bytes
    payload_len: u64,
    /// CRC32C of the payload
    payload_crc: u32,
    /// Reserved for future use
    reserved: [u8; 8],
}

impl VaultHeader {
    fn new(payload: &[u8]) -> Self {
        let mut header = Self {
            magic: VAULT_MAGIC,
            version: STORAGE_VERSION,
            flags: 0,
            header_crc: 0,
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            payload_len: payload.len() as u64,
            payload_crc: crc32c(payload),
            reserved: [0u8; 8],
        };
        header.header_crc = header.calculate_crc();
        header
    }

    fn calculate_crc(&self) -> u32 {
        // Serialize with the CRC field zeroed, as written.
        let mut temp = *self;
        temp.header_crc = 0;
        match bincode::serialize(&temp) {
            Ok(bytes) => crc32c(&bytes),
            Err(_) => 0,
        }
    }

    fn validate(&self, identifier: &str) -> Result<()> {
        if self.magic != VAULT_MAGIC {
            return Err(PersistenceError::Corrupt {
                identifier: identifier.to_string(),
                reason: format!(
                    "invalid magic number: expected {:08x}, got {:08x}",
                    VAULT_MAGIC, self.magic
                ),
                recovery_hint: RecoveryHint::ClearAndRetry,
            });
        }

        if self.version > STORAGE_VERSION {
            return Err(PersistenceError::Corrupt {
                identifier: identifier.to_string(),
                reason: format!("unsupported storage version: {}", self.version),
                recovery_hint: RecoveryHint::Manual {
                    instructions: "Update tokenvault to support the newer vault format"
                        .to_string(),
                },
            });
        }

        let expected_crc = self.calculate_crc();
        if self.header_crc != expected_crc {
            return Err(PersistenceError::Corrupt {
                identifier: identifier.to_string(),
                reason: format!(
                    "header CRC mismatch: expected {expected_crc:08x}, got {:08x}",
                    self.header_crc
                ),
                recovery_hint: RecoveryHint::ClearAndRetry,
            });
        }

        Ok(())
    }
}

/// File-backed store with integrity framing and atomic replacement
#[derive(Debug)]
pub struct ProtectedFileStore {
    path: PathBuf,
}

impl ProtectedFileStore {
    /// Open a store at the given path, creating the parent directory
    ///
    /// The directory is created `0700` and vault files `0600` on unix; the
    /// framing only provides integrity, so access control is all the file
    /// system offers for confidentiality here.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PersistenceError::from_io(
                    BackendKind::ProtectedFile,
                    parent,
                    "create vault directory",
                    e,
                )
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
            }
        }

        Ok(Self { path })
    }

    /// The path this store persists to
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_temp(&self, output: &[u8]) -> io::Result<PathBuf> {
        let temp_path = self
            .path
            .with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        if let Err(e) = file.write_all(output).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        Ok(temp_path)
    }
}

impl SecureStore for ProtectedFileStore {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        let identifier = self.path.display().to_string();

        let file_data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PersistenceError::from_io(
                    BackendKind::ProtectedFile,
                    &self.path,
                    "read vault file",
                    e,
                ));
            }
        };

        let header: VaultHeader = bincode::deserialize(&file_data).map_err(|e| {
            PersistenceError::Corrupt {
                identifier: identifier.clone(),
                reason: format!("unreadable header: {e}"),
                recovery_hint: RecoveryHint::ClearAndRetry,
            }
        })?;

        header.validate(&identifier)?;

        // bincode's encoding is not self-sized; recover the header length by
        // serializing the parsed header again, as written.
        let header_size = bincode::serialized_size(&header).map_err(|e| {
            PersistenceError::Corrupt {
                identifier: identifier.clone(),
                reason: format!("header size: {e}"),
                recovery_hint: RecoveryHint::ClearAndRetry,
            }
        })? as usize;

        if file_data.len() < header_size {
            return Err(PersistenceError::Corrupt {
                identifier,
                reason: "file shorter than its own header".to_string(),
                recovery_hint: RecoveryHint::ClearAndRetry,
            });
        }

        let payload = &file_data[header_size..];
        if payload.len() as u64 != header.payload_len {
            return Err(PersistenceError::Corrupt {
                identifier,
                reason: format!(
                    "truncated payload: header says {} bytes, file has {}",
                    header.payload_len,
                    payload.len()
                ),
                recovery_hint: RecoveryHint::ClearAndRetry,
            });
        }

        let actual_crc = crc32c(payload);
        if actual_crc != header.payload_crc {
            return Err(PersistenceError::Corrupt {
                identifier,
                reason: format!(
                    "payload CRC mismatch: expected {:08x}, got {actual_crc:08x}",
                    header.payload_crc
                ),
                recovery_hint: RecoveryHint::ClearAndRetry,
            });
        }

        Ok(Some(payload.to_vec()))
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let header = VaultHeader::new(data);
        let header_bytes = bincode::serialize(&header).map_err(|e| {
            PersistenceError::Corrupt {
                identifier: self.path.display().to_string(),
                reason: format!("header encode: {e}"),
                recovery_hint: RecoveryHint::Manual {
                    instructions: "Vault header serialization failed".to_string(),
                },
            }
        })?;

        let mut output = Vec::with_capacity(header_bytes.len() + data.len());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);

        let temp_path = self.write_temp(&output).map_err(|e| {
            PersistenceError::from_io(
                BackendKind::ProtectedFile,
                &self.path,
                "write vault file",
                e,
            )
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            PersistenceError::from_io(BackendKind::ProtectedFile, &self.path, "atomic rename", e)
        })?;

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "vault file written");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::from_io(
                BackendKind::ProtectedFile,
                &self.path,
                "clear vault file",
                e,
            )),
        }
    }

    fn describe(&self) -> String {
        format!("protected file '{}'", self.path.display())
    }
}
