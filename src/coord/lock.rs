//! File-existence locks.
//!
//! A lock is a file created with `O_CREAT | O_EXCL`: whoever creates it holds
//! the lock, everyone else polls until it disappears. Acquisition is bounded
//! by a timeout and the token is released when the returned guard goes out of
//! scope, so a crashed holder can at worst stall peers for the timeout, never
//! wedge them forever.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::errors::{PtoError, Result};

/// Handle on a lock token path. Cheap to construct; holds nothing until
/// [`LockFile::acquire`] succeeds.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
    poll_interval: Duration,
}

impl LockFile {
    /// Lock handle for `path`, polling at `poll_interval` while contended.
    pub fn at(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
        }
    }

    /// Path of the lock token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, waiting at most `timeout`.
    ///
    /// The returned guard removes the token on drop. Contention is announced
    /// on stderr about once a second so a stuck run is visible.
    pub fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        let start = Instant::now();
        let mut last_notice = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(_) => {
                    return Ok(LockGuard {
                        path: self.path.clone(),
                        armed: true,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if start.elapsed() >= timeout {
                        return Err(PtoError::LockTimeout {
                            path: self.path.clone(),
                            waited_secs: timeout.as_secs(),
                        });
                    }
                    if last_notice.elapsed() >= Duration::from_secs(1) {
                        eprintln!("[PTO-LOCK] waiting for {} to be released", self.path.display());
                        last_notice = Instant::now();
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => return Err(PtoError::io(&self.path, e)),
            }
        }
    }
}

/// Proof of lock ownership. Dropping it releases the token.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    armed: bool,
}

impl LockGuard {
    /// Release explicitly, surfacing removal errors instead of swallowing them.
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PtoError::io(&self.path, e)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                eprintln!("[PTO-LOCK] failed to remove {}: {e}", self.path.display());
            }
        }
    }
}
