//! Process-table observations and run-id allocation.
//!
//! Worker instances advertise themselves through their argv, so counting how
//! many copies of a case are alive is a `/proc` cmdline scan, not shared
//! state. Counts are advisory by nature: a process may exit between the scan
//! and whatever decision is taken on it.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::core::errors::{PtoError, Result};

/// Directory names that identify a run.
const RUN_ID_PATTERN: &str = "^[0-9]{6}$";

/// Next auto-allocated run id under `logs_dir`.
///
/// Ids are six zero-padded digits. The next id is one past the highest
/// existing run directory; a fresh logs root starts at `000000`. Directories
/// that do not look like run ids are ignored.
pub fn next_run_id(logs_dir: &Path) -> Result<String> {
    let pattern = Regex::new(RUN_ID_PATTERN).map_err(|err| PtoError::Runtime {
        details: format!("run id pattern: {err}"),
    })?;

    let entries = match fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok("000000".to_string()),
        Err(e) => return Err(PtoError::io(logs_dir, e)),
    };

    let mut highest: Option<u32> = None;
    for entry in entries {
        let entry = entry.map_err(|e| PtoError::io(logs_dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !pattern.is_match(name) {
            continue;
        }
        if let Ok(id) = name.parse::<u32>() {
            highest = Some(highest.map_or(id, |h| h.max(id)));
        }
    }

    Ok(highest.map_or_else(|| "000000".to_string(), |h| format!("{:06}", h + 1)))
}

/// Whether an argv belongs to a worker for `test` (and `case`, when given).
///
/// Worker argv is fixed: `<bin> worker <test> <case> <mode> <inst> ...`, so
/// position 1 names the subcommand and positions 2/3 the test and case.
#[must_use]
pub fn is_worker_for(args: &[String], test: &str, case: Option<&str>) -> bool {
    args.get(1).is_some_and(|a| a == "worker")
        && args.get(2).is_some_and(|a| a == test)
        && case.is_none_or(|c| args.get(3).is_some_and(|a| a == c))
}

/// Count live worker processes for `test`, narrowed to one case when given.
///
/// The count includes the calling process when it is itself such a worker.
#[must_use]
pub fn count_workers(test: &str, case: Option<&str>) -> usize {
    count_matching(|args| is_worker_for(args, test, case))
}

/// Count live processes whose argv mentions `subcommand` past the binary
/// name. Used for the server/client role checks on one machine.
#[must_use]
pub fn count_invocations(subcommand: &str) -> usize {
    count_matching(|args| args.iter().skip(1).any(|a| a == subcommand))
}

fn count_matching(matches: impl Fn(&[String]) -> bool) -> usize {
    let Ok(entries) = fs::read_dir("/proc") else {
        return 0;
    };
    let mut count = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        if matches(&split_cmdline(&raw)) {
            count += 1;
        }
    }
    count
}

/// Split a `/proc/<pid>/cmdline` buffer on its NUL separators.
fn split_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}
