//! Run-directory archival.
//!
//! Packs a finished run directory into `<backups_dir>/<run_id>.tar` through
//! the system `tar`. An existing archive for the same run is never
//! overwritten, and a failed pack removes its partial output.

use std::path::Path;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::core::shell::run_shell;

/// Archive one run directory. Returns whether an archive was produced.
pub fn backup_run(config: &Config, folder: &Path) -> Result<bool> {
    if !folder.is_dir() {
        println!("  Test folder [{}] doesn't exist", folder.display());
        return Ok(false);
    }
    let backups = &config.paths.backups_dir;
    if !backups.is_dir() {
        println!("  Backup folder [{}] doesn't exist", backups.display());
        return Ok(false);
    }
    let run_id = folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if run_id.is_empty() {
        println!("No test id set");
        return Ok(false);
    }
    let archive = backups.join(format!("{run_id}.tar"));
    if archive.exists() {
        println!("  Backup in [{}] already exist", archive.display());
        return Ok(false);
    }

    let command = format!("tar -cvf '{}' '{}'", archive.display(), folder.display());
    let out = run_shell(&command, None)?;
    if out.code == 0 {
        println!("Backup generated [{}]", archive.display());
        Ok(true)
    } else {
        println!("Error generating backup:");
        println!("{}", out.output.trim_end());
        if archive.exists() {
            let _ = std::fs::remove_file(&archive);
        }
        Ok(false)
    }
}
