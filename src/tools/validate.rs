//! Post-run integrity check.
//!
//! Recomputes the checksum over a finished run directory and compares it
//! with the value the ledger recorded when the run closed. A changed log
//! file, an added file, or a removed one all flip the verdict.

use std::path::Path;

use colored::Colorize;

use crate::core::errors::{PtoError, Result};
use crate::ledger::checksum::run_directory_checksum;
use crate::ledger::document::RunDocument;

/// Compare a run directory against its recorded checksum.
///
/// Prints the verdict and returns whether the directory is intact. A
/// missing ledger or a ledger without a recorded checksum counts as not
/// valid rather than an error.
pub fn validate_run(folder: &Path) -> Result<bool> {
    let run_id = run_id_of(folder);
    let ledger = folder.join(format!("{run_id}.json"));
    if !ledger.is_file() {
        println!("File doesn't exist : {}", ledger.display());
        return Ok(false);
    }
    let content = std::fs::read_to_string(&ledger).map_err(|e| PtoError::io(&ledger, e))?;
    let doc: RunDocument = serde_json::from_str(&content)?;
    let Some(recorded) = doc.sha256sum else {
        println!("Error: No key with hash data");
        return Ok(false);
    };

    let computed = run_directory_checksum(folder, &run_id)?;
    if computed == recorded {
        println!(
            "Test {run_id} is Valid - Current Hash [{computed}] - Has to check [{recorded}] [ {} ]",
            "OK".green().bold()
        );
        Ok(true)
    } else {
        println!(
            "Test {run_id} was manipulated, It's not valid - Current Hash [{computed}] - Has to check [{recorded}] [ {} ]",
            "X".red().bold()
        );
        Ok(false)
    }
}

/// The run id is the folder's own name.
fn run_id_of(folder: &Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
