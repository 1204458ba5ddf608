#![forbid(unsafe_code)]

//! Process Test Orchestrator (pto) — declarative test runs as batches of
//! supervised worker processes.
//!
//! The moving parts:
//! 1. **Dispatcher** — allocates a run id, spawns one worker process per case
//!    instance, and folds their exit codes into one verdict
//! 2. **Worker guard** — per-process gate that checks mode and concurrency
//!    before a case body runs, then records its outcome
//! 3. **Execution ledger** — one JSON document per run, mutated under a file
//!    lock and sealed with a directory checksum
//! 4. **Remote channel** — a point-to-point TCP listener that relays run
//!    commands, shell commands, and file uploads
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use process_test_orchestrator::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use process_test_orchestrator::core::config::Config;
//! use process_test_orchestrator::ledger::store::{LedgerStore, Mutation};
//! ```

pub mod prelude;

pub mod coord;
pub mod core;
pub mod dispatch;
pub mod guard;
pub mod ledger;
pub mod registry;
pub mod remote;
pub mod runlog;
pub mod tools;
