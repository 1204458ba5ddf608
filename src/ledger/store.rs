//! Ledger persistence.
//!
//! Every change to the on-disk document goes through [`LedgerStore::record`]
//! with one of the [`Mutation`] variants; there is no open-ended write path.
//! Each mutation holds the ledger lock across its read-modify-write, so the
//! dispatcher and any number of workers can interleave appends safely.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coord::lock::LockFile;
use crate::core::config::LockConfig;
use crate::core::errors::{PtoError, Result};
use crate::core::paths;
use crate::ledger::document::{CaseEntry, RunDocument};

/// The closed set of ledger operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    StartDate(String),
    EndDate(String),
    Profile(String),
    Mode(String),
    /// Wipe `test_execution` back to an empty map.
    ResetTestExecution,
    /// Register a test with an empty entry list.
    InitTestList(String),
    /// Append one worker's entry to its test's list.
    AppendCaseEntry { test: String, entry: CaseEntry },
    ExitStatus(i32),
    ExitMessage(String),
    Checksum(String),
}

/// Handle on one run's ledger document and its lock.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    lock: LockFile,
    acquire_timeout: Duration,
}

impl LedgerStore {
    /// Store handle for the ledger of `run_id` inside `run_dir`.
    #[must_use]
    pub fn new(run_dir: &Path, run_id: &str, locks: &LockConfig) -> Self {
        Self {
            path: paths::ledger_path(run_dir, run_id),
            lock: LockFile::at(
                paths::ledger_lock_path(run_dir, run_id),
                locks.poll_interval(),
            ),
            acquire_timeout: locks.acquire_timeout(),
        }
    }

    /// Path of the ledger document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a fresh empty document, replacing any previous content.
    pub fn initialize(&self) -> Result<()> {
        self.write(&RunDocument::default())
    }

    /// Apply one mutation under the ledger lock.
    pub fn record(&self, mutation: Mutation) -> Result<()> {
        let guard = self.lock.acquire(self.acquire_timeout)?;
        let mut doc = self.load()?;
        apply(&mut doc, mutation);
        self.write(&doc)?;
        guard.release()
    }

    /// Read and parse the current document.
    pub fn load(&self) -> Result<RunDocument> {
        let content =
            fs::read_to_string(&self.path).map_err(|source| PtoError::io(&self.path, source))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, doc: &RunDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&self.path, json).map_err(|source| PtoError::io(&self.path, source))
    }
}

fn apply(doc: &mut RunDocument, mutation: Mutation) {
    match mutation {
        Mutation::StartDate(v) => doc.start_date = Some(v),
        Mutation::EndDate(v) => doc.end_date = Some(v),
        Mutation::Profile(v) => doc.profile = Some(v),
        Mutation::Mode(v) => doc.mode = Some(v),
        Mutation::ResetTestExecution => doc.test_execution = Some(std::collections::BTreeMap::new()),
        Mutation::InitTestList(test) => {
            doc.test_execution
                .get_or_insert_with(Default::default)
                .insert(test, Vec::new());
        }
        Mutation::AppendCaseEntry { test, entry } => {
            doc.test_execution
                .get_or_insert_with(Default::default)
                .entry(test)
                .or_default()
                .push(entry);
        }
        Mutation::ExitStatus(v) => doc.exit_status = Some(v),
        Mutation::ExitMessage(v) => doc.exit_msg = Some(v),
        Mutation::Checksum(v) => doc.sha256sum = Some(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(method: &str, instance: u32, status: i32) -> CaseEntry {
        CaseEntry {
            order_exec: 1,
            method: method.to_string(),
            parameters: String::new(),
            start_date: "2026-02-01 10:00:00.000000".into(),
            end_date: "2026-02-01 10:00:01.000000".into(),
            method_mode: "normal".into(),
            concurrency_inst: instance,
            exit_status: status,
            exit_msg: crate::core::exit::exit_message(status).to_string(),
        }
    }

    fn store(dir: &Path) -> LedgerStore {
        LedgerStore::new(dir, "000001", &LockConfig::default())
    }

    #[test]
    fn initialize_writes_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.initialize().unwrap();
        assert_eq!(fs::read_to_string(s.path()).unwrap(), "{}");
        assert_eq!(s.load().unwrap(), RunDocument::default());
    }

    #[test]
    fn mutations_build_up_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.initialize().unwrap();

        s.record(Mutation::StartDate("2026-02-01 10:00:00.000000".into()))
            .unwrap();
        s.record(Mutation::Mode("automation".into())).unwrap();
        s.record(Mutation::ResetTestExecution).unwrap();
        s.record(Mutation::InitTestList("smoke".into())).unwrap();
        s.record(Mutation::AppendCaseEntry {
            test: "smoke".into(),
            entry: entry("boot_check", 1, 0),
        })
        .unwrap();
        s.record(Mutation::AppendCaseEntry {
            test: "smoke".into(),
            entry: entry("boot_check", 2, 1),
        })
        .unwrap();
        s.record(Mutation::ExitStatus(1)).unwrap();
        s.record(Mutation::ExitMessage("Exit with error (1)".into()))
            .unwrap();

        let doc = s.load().unwrap();
        assert_eq!(doc.mode.as_deref(), Some("automation"));
        let entries = &doc.test_execution.unwrap()["smoke"];
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].concurrency_inst, 1);
        assert_eq!(entries[1].exit_status, 1);
        assert_eq!(doc.exit_status, Some(1));
    }

    #[test]
    fn init_test_list_resets_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.initialize().unwrap();

        s.record(Mutation::AppendCaseEntry {
            test: "smoke".into(),
            entry: entry("boot_check", 1, 0),
        })
        .unwrap();
        s.record(Mutation::InitTestList("smoke".into())).unwrap();

        let doc = s.load().unwrap();
        assert!(doc.test_execution.unwrap()["smoke"].is_empty());
    }

    #[test]
    fn record_releases_the_ledger_lock() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.initialize().unwrap();
        s.record(Mutation::Mode("automation".into())).unwrap();
        assert!(!paths::ledger_lock_path(dir.path(), "000001").exists());
    }

    #[test]
    fn record_against_missing_ledger_fails() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let err = s.record(Mutation::Mode("automation".into())).unwrap_err();
        assert!(matches!(err, PtoError::Io { .. }));
    }

    #[test]
    fn scalar_mutations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.initialize().unwrap();
        s.record(Mutation::ExitStatus(0)).unwrap();
        s.record(Mutation::ExitStatus(0)).unwrap();
        let first = fs::read_to_string(s.path()).unwrap();
        s.record(Mutation::ExitStatus(0)).unwrap();
        assert_eq!(fs::read_to_string(s.path()).unwrap(), first);
    }
}
