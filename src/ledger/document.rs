//! Ledger document model.
//!
//! An empty document serializes to `{}`; fields appear as the run populates
//! them. `test_execution` maps each test name to the case entries its workers
//! appended, in completion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Whole-run record, one per run directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Present only when the run came from a profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_execution: Option<BTreeMap<String, Vec<CaseEntry>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256sum: Option<String>,
}

/// One worker's account of one case execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseEntry {
    /// Order slot the case occupies in its test definition.
    pub order_exec: u32,
    /// Case name.
    pub method: String,
    /// Comma-joined invocation arguments, empty when none.
    pub parameters: String,
    pub start_date: String,
    pub end_date: String,
    /// `normal` or `concurrency`.
    pub method_mode: String,
    /// Which instance of the case this worker was (1-based).
    pub concurrency_inst: u32,
    pub exit_status: i32,
    pub exit_msg: String,
}
