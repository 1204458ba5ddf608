//! Run-directory layout and shared path utilities.
//!
//! Every artifact of a run lives in one directory, `<logs>/<run_id>/`:
//! the ledger document `<run_id>.json`, the run log `<run_id>.log`, one log
//! per worker `<test>_<case>_<instance>.log`, and the coordination files
//! (`exit_conc`, `exit_conc.lock`, `exit_conc_par.lock`, `<run_id>.json.lock`).
//! The names are fixed; everything that touches a run goes through these
//! builders.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Exit-counter file name inside a run directory.
pub const EXIT_COUNTER_FILE: &str = "exit_conc";
/// Lock token guarding the exit counter.
pub const EXIT_COUNTER_LOCK_FILE: &str = "exit_conc.lock";
/// Flag file marking a run as parallel-mode.
pub const PARALLEL_FLAG_FILE: &str = "exit_conc_par.lock";

/// Directory holding all artifacts of one run.
#[must_use]
pub fn run_dir(logs_dir: &Path, run_id: &str) -> PathBuf {
    logs_dir.join(run_id)
}

/// The run's ledger document.
#[must_use]
pub fn ledger_path(run_dir: &Path, run_id: &str) -> PathBuf {
    run_dir.join(format!("{run_id}.json"))
}

/// Lock token guarding the ledger document.
#[must_use]
pub fn ledger_lock_path(run_dir: &Path, run_id: &str) -> PathBuf {
    run_dir.join(format!("{run_id}.json.lock"))
}

/// The run-level append-only log file.
#[must_use]
pub fn run_log_path(run_dir: &Path, run_id: &str) -> PathBuf {
    run_dir.join(format!("{run_id}.log"))
}

/// Per-worker log file, one per `(test, case, instance)`.
#[must_use]
pub fn case_log_path(run_dir: &Path, test: &str, case: &str, instance: u32) -> PathBuf {
    run_dir.join(format!("{test}_{case}_{instance}.log"))
}

/// Exit-counter file for the run's shutdown protocol.
#[must_use]
pub fn exit_counter_path(run_dir: &Path) -> PathBuf {
    run_dir.join(EXIT_COUNTER_FILE)
}

/// Lock token scoped to the exit counter (separate from the ledger lock).
#[must_use]
pub fn exit_counter_lock_path(run_dir: &Path) -> PathBuf {
    run_dir.join(EXIT_COUNTER_LOCK_FILE)
}

/// Parallel-mode flag file.
#[must_use]
pub fn parallel_flag_path(run_dir: &Path) -> PathBuf {
    run_dir.join(PARALLEL_FLAG_FILE)
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve
/// symlinks and normalize components. If it fails (e.g. path does not exist
/// yet), the path is made absolute relative to CWD and `..`/`.` components
/// are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
