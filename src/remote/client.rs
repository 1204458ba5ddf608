//! The command sender.
//!
//! Connects over the point-to-point link, writes one command, and prints
//! whatever comes back until the terminator, `Server closed!`, or EOF.
//! File transfers use a second connection for the payload after the ack
//! arrives on the first.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::errors::{PtoError, Result};
use crate::core::exit::ExitStatus;
use crate::core::signals::SignalState;
use crate::dispatch::proc_table;
use crate::remote::netif;
use crate::remote::protocol::{CHUNK_SIZE, END_COMMAND, IMAGE_MODE_OK, SERVER_CLOSED};

const INTERFACE_RETRY: Duration = Duration::from_secs(2);
const CONNECT_RETRY: Duration = Duration::from_secs(2);
const UPLOAD_SETTLE: Duration = Duration::from_secs(1);

/// Sends commands to a running listener on the peer device.
pub struct RemoteClient {
    config: Config,
    signals: SignalState,
}

impl RemoteClient {
    #[must_use]
    pub const fn new(config: Config, signals: SignalState) -> Self {
        Self { config, signals }
    }

    /// Send one command and print the reply. Returns the client exit code:
    /// `0` on a terminated reply, `-1` when the reply timed out.
    pub fn send_command(&self, command: &str) -> Result<i32> {
        self.prepare()?;
        let mut stream = self.connect_with_retry()?;
        let (code, response) = self.collect_response(&mut stream, command)?;
        println!("Response to command: <{response}>");
        Ok(code)
    }

    /// Push a local file to the peer in 1KB chunks.
    pub fn send_file(&self, source: &Path, dest: &str) -> Result<i32> {
        if !source.is_file() {
            println!("File trying to send doesn't exist");
            return Ok(1);
        }
        let payload = std::fs::read(source).map_err(|e| PtoError::io(source, e))?;
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (name, ext) = split_file_name(&base);

        self.prepare()?;
        let mut command_conn = self.connect_with_retry()?;
        command_conn
            .write_all(format!("SendFile:{name}:{ext}:{dest}").as_bytes())
            .map_err(|e| PtoError::io("connection", e))?;
        let mut buf = [0u8; CHUNK_SIZE];
        let received = command_conn
            .read(&mut buf)
            .map_err(|e| PtoError::io("connection", e))?;
        let ack = String::from_utf8_lossy(&buf[..received]).into_owned();
        println!("Response to command: <{ack}>");
        if !ack.starts_with(IMAGE_MODE_OK) {
            return Ok(1);
        }
        drop(command_conn);

        // The listener is already waiting on its accept deadline, so a
        // failure here is real and not worth polling on.
        let mut upload = self.connect()?;
        thread::sleep(UPLOAD_SETTLE);
        let total = chunk_count(payload.len());
        for (index, chunk) in payload.chunks(CHUNK_SIZE).enumerate() {
            upload
                .write_all(chunk)
                .map_err(|e| PtoError::io("upload", e))?;
            println!(
                "Sending File ({}%) - [{base}]...",
                transfer_percent(index, total)
            );
        }
        println!("Done File Sending");
        upload
            .shutdown(Shutdown::Write)
            .map_err(|e| PtoError::io("upload", e))?;
        let received = upload.read(&mut buf).map_err(|e| PtoError::io("upload", e))?;
        let reply = String::from_utf8_lossy(&buf[..received]).into_owned();
        println!("Response to command: <{reply}>");
        Ok(0)
    }

    /// Refuse to run next to a listener, then bring the link up, retrying
    /// until the interface appears or a signal arrives.
    fn prepare(&self) -> Result<()> {
        if proc_table::count_invocations("serve") > 0 {
            return Err(PtoError::RoleConflict {
                details: "Client can't run. Server is running in this machine/device".to_string(),
            });
        }
        loop {
            if self.signals.interrupted() {
                self.exit_by_signal();
            }
            match netif::ensure_interface(&self.config.remote, &self.config.remote.client_ip) {
                Ok(_) => return Ok(()),
                Err(PtoError::InterfaceUnavailable { .. }) => {
                    println!("Waiting to stablish connection interface...");
                    thread::sleep(INTERFACE_RETRY);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Connect to the listener, polling through transient failures until a
    /// connection lands or a signal arrives. Covers the window where the
    /// peer's listener is not up yet on a freshly configured link.
    fn connect_with_retry(&self) -> Result<TcpStream> {
        loop {
            if self.signals.interrupted() {
                self.exit_by_signal();
            }
            match self.connect() {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_retryable() => {
                    println!("No connection to Server: {e}");
                    println!("Retrying...");
                    thread::sleep(CONNECT_RETRY);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn connect(&self) -> Result<TcpStream> {
        let addr = format!(
            "{}:{}",
            self.config.remote.server_ip, self.config.remote.server_port
        );
        match TcpStream::connect(&addr) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(Duration::from_secs(
                        self.config.remote.recv_timeout_secs,
                    )))
                    .map_err(|e| PtoError::io(&addr, e))?;
                Ok(stream)
            }
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                Err(PtoError::ConnectionRefused { addr })
            }
            Err(e) => Err(PtoError::io(&addr, e)),
        }
    }

    /// Write the command and accumulate reply segments until a terminator.
    fn collect_response(&self, stream: &mut TcpStream, command: &str) -> Result<(i32, String)> {
        stream
            .write_all(command.as_bytes())
            .map_err(|e| PtoError::io("connection", e))?;
        let mut response = String::new();
        let mut code = 0;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            if self.signals.interrupted() {
                self.exit_by_signal();
            }
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(received) => {
                    let chunk = String::from_utf8_lossy(&buf[..received]).into_owned();
                    response.push('\n');
                    response.push_str(&chunk);
                    if chunk == SERVER_CLOSED || chunk.starts_with(END_COMMAND) {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    println!("Timeout: {command}");
                    let _ = stream.shutdown(Shutdown::Write);
                    code = ExitStatus::Timeout.code();
                    break;
                }
                Err(e) => return Err(PtoError::io("connection", e)),
            }
        }
        Ok((code, response))
    }

    fn exit_by_signal(&self) -> ! {
        let signal = self
            .signals
            .last_signal()
            .unwrap_or(signal_hook::consts::SIGINT);
        println!("Killed by signal [{signal}]");
        std::process::exit(ExitStatus::BySignal.code());
    }
}

/// First dot-separated segment as the name, second as the extension.
/// Segments past the second are dropped on the wire.
fn split_file_name(base: &str) -> (String, String) {
    let mut parts = base.split('.');
    let name = parts.next().unwrap_or_default().to_string();
    let ext = parts.next().unwrap_or_default().to_string();
    (name, ext)
}

fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_SIZE).max(1)
}

fn transfer_percent(index: usize, total: usize) -> usize {
    (100 * (index + 1) / total).min(100)
}
