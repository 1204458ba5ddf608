//! Durable exit counter.
//!
//! A single integer in `exit_conc` inside the run directory, guarded by its
//! own lock token (`exit_conc.lock`, separate from the ledger lock). Workers
//! bump it while deciding who finalizes the run: sequential shutdown counts
//! up toward the instance total, parallel shutdown counts down toward zero.
//! A missing or unreadable counter reads as zero.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::coord::lock::LockFile;
use crate::core::config::LockConfig;
use crate::core::errors::{PtoError, Result};
use crate::core::paths;

/// Handle on the counter file and its lock.
#[derive(Debug, Clone)]
pub struct ExitCounter {
    path: PathBuf,
    lock: LockFile,
    acquire_timeout: std::time::Duration,
}

impl ExitCounter {
    /// Counter handle for `run_dir`.
    #[must_use]
    pub fn new(run_dir: &Path, locks: &LockConfig) -> Self {
        Self {
            path: paths::exit_counter_path(run_dir),
            lock: LockFile::at(paths::exit_counter_lock_path(run_dir), locks.poll_interval()),
            acquire_timeout: locks.acquire_timeout(),
        }
    }

    /// Path of the counter file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a fresh counter at zero, replacing any previous value.
    pub fn initialize(&self) -> Result<()> {
        fs::write(&self.path, b"0").map_err(|source| PtoError::io(&self.path, source))
    }

    /// Current value. Absent or unparseable content reads as zero.
    #[must_use]
    pub fn read(&self) -> i64 {
        match fs::read_to_string(&self.path) {
            Ok(content) => content.trim().parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Add `delta` under the counter lock and return the new value.
    ///
    /// Creates the counter file if it is missing, so an adjust against a
    /// never-initialized counter behaves as if it had started at zero.
    pub fn adjust(&self, delta: i64) -> Result<i64> {
        let guard = self.lock.acquire(self.acquire_timeout)?;
        let value = self.read() + delta;
        fs::write(&self.path, value.to_string()).map_err(|source| PtoError::io(&self.path, source))?;
        guard.release()?;
        Ok(value)
    }

    /// Remove the counter and its lock token. Best effort; a vanished file is
    /// not worth failing a shutdown over.
    pub fn remove(&self) {
        for path in [self.path.as_path(), self.lock.path()] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != ErrorKind::NotFound {
                    eprintln!("[PTO-LOCK] failed to remove {}: {e}", path.display());
                }
            }
        }
    }
}
