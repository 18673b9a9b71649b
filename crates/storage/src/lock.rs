//! Cross-process lock guarding the shared store
//!
//! The same physical vault may be used by several processes at once, so
//! every read-modify-write sequence takes an advisory file lock next to the
//! store. Acquisition is bounded: a configurable number of attempts spaced
//! by a configurable delay, after which the lock reports the backend as
//! unavailable rather than blocking forever. The holder's PID is written
//! into the lock file so a lock abandoned by a dead process can be broken.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as IoWrite};
use std::path::Path;
use std::time::Duration;
use tokenvault_core::{BackendKind, PersistenceError, RecoveryHint, Result};

/// An exclusive advisory lock on a vault's lock file
#[derive(Debug)]
pub struct CrossProcessLock {
    lock_file: File,
}

impl CrossProcessLock {
    /// Acquire the lock, retrying `retry_count` times spaced by `retry_delay`
    pub fn acquire(lock_path: &Path, retry_count: u32, retry_delay: Duration) -> Result<Self> {
        let attempts = retry_count.max(1);

        for attempt in 0..attempts {
            match Self::try_acquire(lock_path) {
                Ok(lock) => return Ok(lock),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if attempt + 1 < attempts {
                        std::thread::sleep(retry_delay);
                    }
                }
                Err(e) => {
                    return Err(PersistenceError::from_io(
                        BackendKind::ProtectedFile,
                        lock_path,
                        "acquire cross-process lock",
                        e,
                    ));
                }
            }
        }

        Err(PersistenceError::BackendUnavailable {
            backend: BackendKind::ProtectedFile,
            reason: format!(
                "lock '{}' still held after {attempts} attempts",
                lock_path.display()
            ),
            source: None,
            recovery_hint: RecoveryHint::Retry { after: retry_delay },
        })
    }

    /// Single non-blocking acquisition attempt
    fn try_acquire(lock_path: &Path) -> io::Result<Self> {
        Self::try_acquire_with(lock_path, is_process_running)
    }

    /// Acquisition with an explicit holder-liveness probe
    fn try_acquire_with(lock_path: &Path, alive: fn(u32) -> bool) -> io::Result<Self> {
        let mut lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {
                // Record our PID so other processes can detect a stale lock.
                let pid = std::process::id();
                lock_file.set_len(0)?;
                writeln!(lock_file, "{pid}")?;
                lock_file.sync_all()?;

                Ok(Self { lock_file })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // Held elsewhere. Break the lock if its holder is dead.
                if let Ok(contents) = fs::read_to_string(lock_path) {
                    if let Ok(holder_pid) = contents.trim().parse::<u32>() {
                        if !alive(holder_pid) {
                            tracing::warn!(
                                holder_pid,
                                lock = %lock_path.display(),
                                "breaking lock held by dead process"
                            );
                            drop(lock_file);
                            fs::remove_file(lock_path)?;
                            return Self::try_acquire_with(lock_path, alive);
                        }
                    }
                }

                Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("vault lock held: {}", lock_path.display()),
                ))
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for CrossProcessLock {
    fn drop(&mut self) {
        // Release the flock but leave the file in place. Unlinking it here
        // would let a waiter holding the old inode and a newcomer on a
        // fresh file both believe they own the lock.
        let _ = fs2::FileExt::unlock(&self.lock_file);
    }
}

/// Check if a process with the given PID is running
fn is_process_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }

    #[cfg(unix)]
    {
        // Signal 0 probes existence without delivering anything.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        // Without a portable liveness probe, never steal a lock.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_is_exclusive_within_a_process() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("cache.bin.lockfile");

        let first = CrossProcessLock::acquire(&lock_path, 1, Duration::from_millis(1)).unwrap();

        let second = CrossProcessLock::acquire(&lock_path, 2, Duration::from_millis(1));
        match second {
            Err(PersistenceError::BackendUnavailable { .. }) => {}
            other => panic!("expected unavailable, got {other:?}"),
        }

        drop(first);
        CrossProcessLock::acquire(&lock_path, 1, Duration::from_millis(1)).unwrap();
    }

    #[test]
    fn lock_file_records_holder_pid() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("cache.bin.lockfile");

        let _lock = CrossProcessLock::acquire(&lock_path, 1, Duration::from_millis(1)).unwrap();

        let contents = fs::read_to_string(&lock_path).unwrap();
        assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
    }

    #[test]
    fn drop_releases_lock_but_keeps_file() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("cache.bin.lockfile");

        let lock = CrossProcessLock::acquire(&lock_path, 1, Duration::from_millis(1)).unwrap();
        drop(lock);

        assert!(lock_path.exists());
        CrossProcessLock::acquire(&lock_path, 1, Duration::from_millis(1)).unwrap();
    }

    #[test]
    fn lock_held_by_dead_process_is_broken() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("cache.bin.lockfile");

        // Stand in for an abandoned holder: a flock on the file from a
        // separate handle, with someone else's PID recorded in it.
        let mut holder = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .unwrap();
        holder.try_lock_exclusive().unwrap();
        writeln!(holder, "999999").unwrap();
        holder.sync_all().unwrap();

        let lock = CrossProcessLock::try_acquire_with(&lock_path, |_| false).unwrap();

        let contents = fs::read_to_string(&lock_path).unwrap();
        assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
        drop(lock);
        drop(holder);
    }

    #[test]
    fn lock_held_by_live_process_is_not_broken() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("cache.bin.lockfile");

        let mut holder = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .unwrap();
        holder.try_lock_exclusive().unwrap();
        writeln!(holder, "999999").unwrap();
        holder.sync_all().unwrap();

        let attempt = CrossProcessLock::try_acquire_with(&lock_path, |_| true);
        assert_eq!(attempt.unwrap_err().kind(), io::ErrorKind::WouldBlock);
        drop(holder);
    }
}
