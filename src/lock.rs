//! Advisory file locks with a bounded wait.
//!
//! Locks are `flock`-style and only bind processes that take them too.
//! Acquisition polls a non-blocking try-lock until the deadline passes, so a
//! stuck peer turns into a `LockTimeout` instead of a hung run.

use crate::store::StoreError;
use fs2::FileExt;
use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Holds the lock for as long as it lives.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
}

impl LockedFile {
    pub fn acquire(file: File, mode: LockMode, path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        let started = Instant::now();
        let contended = fs2::lock_contended_error();
        let mut logged = false;
        loop {
            // Fully qualified: newer std `File` has inherent methods of the same names.
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => return Ok(Self { file }),
                Err(e) if e.raw_os_error().is_some() && e.raw_os_error() == contended.raw_os_error() => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        tracing::warn!(path = %path.display(), ?mode, waited_ms = waited.as_millis() as u64, "lock wait timed out");
                        return Err(StoreError::LockTimeout { path: path.to_path_buf(), waited });
                    }
                    if !logged {
                        tracing::debug!(path = %path.display(), ?mode, "waiting for lock");
                        logged = true;
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
