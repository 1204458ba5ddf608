//! Parallel-mode flag.
//!
//! The dispatcher drops `exit_conc_par.lock` into the run directory when an
//! interrupted parallel run hands shutdown over to its workers. Workers probe
//! for the file to pick the counting direction; content never matters, only
//! existence.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::errors::{PtoError, Result};
use crate::core::paths;

/// Handle on the flag file for one run directory.
#[derive(Debug, Clone)]
pub struct ParallelFlag {
    path: PathBuf,
}

impl ParallelFlag {
    /// Flag handle for `run_dir`.
    #[must_use]
    pub fn new(run_dir: &Path) -> Self {
        Self {
            path: paths::parallel_flag_path(run_dir),
        }
    }

    /// Raise the flag.
    pub fn set(&self) -> Result<()> {
        fs::write(&self.path, b"").map_err(|source| PtoError::io(&self.path, source))
    }

    /// Whether the flag is raised.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    /// Lower the flag. Best effort.
    pub fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                eprintln!("[PTO-LOCK] failed to remove {}: {e}", self.path.display());
            }
        }
    }
}
