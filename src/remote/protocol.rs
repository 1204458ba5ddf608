//! Command vocabulary of the point-to-point channel.
//!
//! A command is one short line on its own connection, classified by prefix.
//! Recognized verbs with a broken shape still get a reply, so the caller
//! always hears back before the terminator closes the exchange.

/// Terminator closing every command response.
pub const END_COMMAND: &str = "<EndCommand>";
/// Acknowledgement switching the link into upload mode.
pub const IMAGE_MODE_OK: &str = "<Image Mode OK>";
/// Refusal when the upload destination cannot be opened.
pub const IMAGE_MODE_ERROR: &str = "<Image Mode ERROR>";
/// Sent to a connected peer when the listener is going down.
pub const SERVER_CLOSED: &str = "Server closed!";
/// Upload chunk size in bytes; also the command read size.
pub const CHUNK_SIZE: usize = 1024;

/// Reply to the `Help` command.
pub const HELP_MENU: &str = "\
Usage: Commands

  ShellCommand:<command>                         -> run a shell command on the listener
      Example: ShellCommand:ls
  RunTest:<test name>                            -> run a test on the listener
      Example: RunTest:testexample1
  RunProfile:<profile name>                      -> run a profile on the listener
      Example: RunProfile:profileexample1
  RunDefinition|<file>|<runmode>|<id>|<logs dir> -> run a definition document on the listener
  SendFile:<name>:<ext>:<destination dir>        -> upload a file over a second connection
  Help                                           -> this menu
";

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `ShellCommand:<command>` — bounded shell execution.
    Shell(String),
    /// `RunProfile:<name>` — run a profile from the catalog.
    RunProfile(String),
    /// `RunTest:<name>` — run a test from the catalog.
    RunTest(String),
    /// `RunDefinition|<file>|<runmode>|<id>|<logs dir>` — run a definition
    /// document carried by path. Empty `<id>` means auto allocation.
    RunDefinition {
        definition: String,
        runmode: String,
        run_id: String,
        logs_dir: String,
    },
    /// `SendFile:<name>:<ext>:<dest>` — announce an upload.
    SendFile {
        name: String,
        ext: String,
        dest: String,
    },
    Help,
    /// Recognized verb, broken shape; carries the reply to send.
    Malformed(&'static str),
    Unknown,
}

impl Command {
    /// Classify one received line.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("ShellCommand") {
            return match trimmed.split_once(':') {
                Some((_, cmd)) if !cmd.trim().is_empty() => Self::Shell(cmd.to_string()),
                _ => Self::Malformed("ShellCommand command malformed"),
            };
        }
        if trimmed.starts_with("RunProfile") {
            return match trimmed.split_once(':') {
                Some((_, name)) if !name.trim().is_empty() => {
                    Self::RunProfile(name.trim().to_string())
                }
                _ => Self::Malformed("RunProfile command malformed"),
            };
        }
        if trimmed.starts_with("RunTest") {
            return match trimmed.split_once(':') {
                Some((_, name)) if !name.trim().is_empty() => {
                    Self::RunTest(name.trim().to_string())
                }
                _ => Self::Malformed("RunTest command malformed"),
            };
        }
        if trimmed.starts_with("RunDefinition") {
            let parts: Vec<&str> = trimmed.split('|').collect();
            if parts.len() > 4 && !parts[1].trim().is_empty() {
                return Self::RunDefinition {
                    definition: parts[1].trim().to_string(),
                    runmode: parts[2].trim().to_string(),
                    run_id: parts[3].trim().to_string(),
                    logs_dir: parts[4].trim().to_string(),
                };
            }
            return Self::Malformed("RunDefinition not available yet");
        }
        if trimmed.starts_with("SendFile") {
            let parts: Vec<&str> = trimmed.split(':').collect();
            if parts.len() == 4 && !parts[1].is_empty() {
                return Self::SendFile {
                    name: parts[1].to_string(),
                    ext: parts[2].to_string(),
                    dest: parts[3].to_string(),
                };
            }
            return Self::Malformed("SendFile command malformed");
        }
        if trimmed == "Help" {
            return Self::Help;
        }
        Self::Unknown
    }
}
