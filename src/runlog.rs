//! Per-run logging: append-only log files mirrored to the console.
//!
//! Every run owns `<run_id>.log`; every worker additionally owns
//! `<test>_<case>_<instance>.log`. Lines carry a timestamp, a severity tag,
//! and an optional status label that is color-coded on the console
//! (green OK, red X, yellow WRN). File writes are best-effort:
//! a worker must never die because its log file went away, so write failures
//! degrade to stderr.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::core::errors::{PtoError, Result};
use crate::core::paths;

/// Visual separator used around headers, footers, and summaries.
pub const SEPARATOR: &str = "=====================================================";

/// Timestamp format shared by log lines and ledger dates.
pub const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current local time in the shared log/ledger format.
#[must_use]
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FMT).to_string()
}

/// Line severity tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Info,
    Error,
    Warning,
    Debug,
    Success,
    Passed,
    Failed,
}

impl Tag {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Debug => "DEBUG",
            Self::Success => "SUCCESS",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        }
    }
}

/// Status label appended to a line, color-coded on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Wrong,
    Warn,
}

impl Status {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Wrong => "X",
            Self::Warn => "WRN",
        }
    }

    fn colored(self) -> colored::ColoredString {
        match self {
            Self::Ok => self.as_str().green().bold(),
            Self::Wrong => self.as_str().red().bold(),
            Self::Warn => self.as_str().yellow().bold(),
        }
    }
}

/// Appends to one log file and mirrors to the console on request.
#[derive(Debug, Clone)]
pub struct RunLogger {
    file_path: PathBuf,
    debug: bool,
}

impl RunLogger {
    /// Logger for the run-level log file, creating the run directory.
    pub fn for_run(logs_dir: &Path, run_id: &str, debug: bool) -> Result<Self> {
        let dir = paths::run_dir(logs_dir, run_id);
        std::fs::create_dir_all(&dir).map_err(|source| PtoError::io(&dir, source))?;
        Ok(Self {
            file_path: paths::run_log_path(&dir, run_id),
            debug,
        })
    }

    /// Logger for one worker's log file, creating the run directory.
    pub fn for_case(
        logs_dir: &Path,
        run_id: &str,
        test: &str,
        case: &str,
        instance: u32,
        debug: bool,
    ) -> Result<Self> {
        let dir = paths::run_dir(logs_dir, run_id);
        std::fs::create_dir_all(&dir).map_err(|source| PtoError::io(&dir, source))?;
        Ok(Self {
            file_path: paths::case_log_path(&dir, test, case, instance),
            debug,
        })
    }

    /// Path of the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Append a line to the log file.
    pub fn log(&self, msg: &str, tag: Tag) {
        if self.suppressed(tag) {
            return;
        }
        self.append(&format!("[ {} ] [ {} ] {msg}\n", timestamp_now(), tag.as_str()));
    }

    /// Append a line with a status label.
    pub fn log_with(&self, msg: &str, tag: Tag, status: Status) {
        if self.suppressed(tag) {
            return;
        }
        self.append(&format!(
            "[ {} ] [ {} ] {msg} [ {} ]\n",
            timestamp_now(),
            tag.as_str(),
            status.as_str()
        ));
    }

    /// Print a line to the console.
    pub fn show(&self, msg: &str, tag: Tag) {
        if self.suppressed(tag) {
            return;
        }
        println!("[ {} ] [ {} ] - {msg}", timestamp_now(), tag.as_str());
    }

    /// Print a line with a color-coded status label.
    pub fn show_with(&self, msg: &str, tag: Tag, status: Status) {
        if self.suppressed(tag) {
            return;
        }
        println!(
            "[ {} ] [ {} ] - {msg} [ {} ]",
            timestamp_now(),
            tag.as_str(),
            status.colored()
        );
    }

    /// Console and file at once.
    pub fn log_show(&self, msg: &str, tag: Tag) {
        self.show(msg, tag);
        self.log(msg, tag);
    }

    /// Console and file at once, with status.
    pub fn log_show_with(&self, msg: &str, tag: Tag, status: Status) {
        self.show_with(msg, tag, status);
        self.log_with(msg, tag, status);
    }

    fn suppressed(&self, tag: Tag) -> bool {
        tag == Tag::Debug && !self.debug
    }

    fn append(&self, line: &str) {
        let opened = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.file_path);
        match opened {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    eprintln!("[PTO-LOG] write failed for {}: {e}", self.file_path.display());
                }
            }
            Err(e) => {
                eprintln!("[PTO-LOG] open failed for {}: {e}", self.file_path.display());
            }
        }
    }
}
