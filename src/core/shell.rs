//! Bounded shell execution.
//!
//! Runs a command line under `sh -c` with an optional deadline. A timeout is
//! an expected outcome (the remote channel reports it with its own exit
//! code), so it is returned as a `ShellOutput` rather than an error; only
//! spawn failures are errors.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::errors::{PtoError, Result};
use crate::core::exit::ExitStatus;

/// Fixed output recorded when a command exceeds its deadline.
pub const SHELL_TIMEOUT_MSG: &str = "command timeout";

const WAIT_POLL: Duration = Duration::from_millis(50);

/// Captured outcome of a shell command.
#[derive(Debug, Clone)]
pub struct ShellOutput {
    /// Exit code; `-1` when the deadline fired.
    pub code: i32,
    /// Captured stdout (stderr passes through to the caller's stderr).
    pub output: String,
}

/// Run `command` under `sh -c`, optionally bounded by `timeout`.
///
/// The child is killed when the deadline fires. Stdout is drained on a
/// separate thread so a chatty child cannot deadlock on a full pipe.
pub fn run_shell(command: &str, timeout: Option<Duration>) -> Result<ShellOutput> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| PtoError::io("sh", source))?;

    let stdout = child.stdout.take();
    let drain = thread::Builder::new()
        .name("pto-shell-drain".to_string())
        .spawn(move || {
            let mut buf = String::new();
            if let Some(mut out) = stdout {
                let _ = out.read_to_string(&mut buf);
            }
            buf
        })
        .map_err(|source| PtoError::io("pto-shell-drain", source))?;

    let deadline = timeout.map(|t| Instant::now() + t);
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| PtoError::io("sh", source))?
        {
            break status;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                let _ = drain.join();
                return Ok(ShellOutput {
                    code: ExitStatus::Timeout.code(),
                    output: SHELL_TIMEOUT_MSG.to_string(),
                });
            }
        }
        thread::sleep(WAIT_POLL);
    };

    let output = drain.join().unwrap_or_default();
    Ok(ShellOutput {
        code: exit_code_of(status),
        output,
    })
}

/// Exit code of a waited child; children killed by a signal report the
/// by-signal code instead of a raw `None`.
#[must_use]
pub fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(ExitStatus::BySignal.code())
}
