//! Run-directory content checksum.
//!
//! The seal hashes every file under the run directory except the ledger
//! document itself (which receives the result), walking paths in sorted
//! order so the digest is stable across filesystems. Each file contributes a
//! `"<sha256-hex>  <relative-path>\n"` line to an outer SHA-256.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::core::errors::{PtoError, Result};

/// Checksum of `run_dir` contents, excluding `<run_id>.json`.
pub fn run_directory_checksum(run_dir: &Path, run_id: &str) -> Result<String> {
    let ledger_name = format!("{run_id}.json");
    let mut files = Vec::new();
    collect_files(run_dir, &mut files)?;
    files.sort();

    let mut outer = Sha256::new();
    for path in files {
        if path.file_name().is_some_and(|n| n == ledger_name.as_str()) {
            continue;
        }
        let digest = file_sha256(&path)?;
        let rel = path.strip_prefix(run_dir).unwrap_or(&path);
        outer.update(format!("{digest}  {}\n", rel.display()));
    }
    let digest = outer.finalize();
    Ok(format!("{digest:x}"))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|source| PtoError::io(dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| PtoError::io(dir, source))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|source| PtoError::io(&path, source))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|source| PtoError::io(path, source))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|source| PtoError::io(path, source))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let digest = hasher.finalize();
    Ok(format!("{digest:x}"))
}
