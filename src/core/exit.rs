//! Run and worker exit-status vocabulary.
//!
//! Workers, the dispatcher, and the remote listener all speak the same
//! four-code contract: `0` success, `1` general error, `2` terminated by
//! signal, `-1` timeout. The codes and their fixed messages are recorded in
//! the execution ledger, so they are part of the on-disk format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal outcome of a worker, a run, or a remote shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    /// A bounded execution exceeded its deadline.
    Timeout,
    /// Finished without error.
    Success,
    /// General error.
    Error,
    /// Terminated by SIGINT/SIGTERM.
    BySignal,
}

impl ExitStatus {
    /// Numeric code as recorded in the ledger and used for `process::exit`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Timeout => -1,
            Self::Success => 0,
            Self::Error => 1,
            Self::BySignal => 2,
        }
    }

    /// Map a raw code back to a status. Unknown codes fold into `Error`.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::Timeout,
            0 => Self::Success,
            2 => Self::BySignal,
            _ => Self::Error,
        }
    }

    /// Fixed human-readable message recorded next to the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Timeout => "Timeout exit (-1)",
            Self::Success => "Exit without error (0)",
            Self::Error => "Exit with error (1)",
            Self::BySignal => "System signal (2), exit.",
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Message for an arbitrary recorded code, including codes no status maps to.
#[must_use]
pub fn exit_message(code: i32) -> &'static str {
    match code {
        -1 => ExitStatus::Timeout.message(),
        0 => ExitStatus::Success.message(),
        1 => ExitStatus::Error.message(),
        2 => ExitStatus::BySignal.message(),
        _ => "Unknown reason exit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for status in [
            ExitStatus::Timeout,
            ExitStatus::Success,
            ExitStatus::Error,
            ExitStatus::BySignal,
        ] {
            assert_eq!(ExitStatus::from_code(status.code()), status);
        }
    }

    #[test]
    fn unknown_codes_fold_into_error() {
        assert_eq!(ExitStatus::from_code(42), ExitStatus::Error);
        assert_eq!(ExitStatus::from_code(-7), ExitStatus::Error);
    }

    #[test]
    fn messages_embed_the_code() {
        assert_eq!(exit_message(0), "Exit without error (0)");
        assert_eq!(exit_message(1), "Exit with error (1)");
        assert_eq!(exit_message(2), "System signal (2), exit.");
        assert_eq!(exit_message(-1), "Timeout exit (-1)");
        assert_eq!(exit_message(99), "Unknown reason exit");
    }
}
