//! The command listener.
//!
//! One connection carries one command: accept, read up to 1KB, dispatch,
//! settle briefly, send the terminator, close, accept again. Run commands
//! re-invoke this binary and stream the child's stdout down the wire as it
//! appears. `SendFile` flips the link into upload mode: the ack goes back on
//! the command connection and the payload arrives on the next accepted
//! connection in 1KB chunks.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::{Command as Process, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::{PtoError, Result};
use crate::core::exit::ExitStatus;
use crate::core::shell::run_shell;
use crate::core::signals::SignalState;
use crate::dispatch::proc_table;
use crate::remote::netif;
use crate::remote::protocol::{
    CHUNK_SIZE, Command, END_COMMAND, HELP_MENU, IMAGE_MODE_ERROR, IMAGE_MODE_OK, SERVER_CLOSED,
};

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const REPLY_SETTLE: Duration = Duration::from_millis(100);

/// Serves the command channel on the point-to-point link.
pub struct RemoteServer {
    config: Config,
    signals: SignalState,
}

impl RemoteServer {
    #[must_use]
    pub const fn new(config: Config, signals: SignalState) -> Self {
        Self { config, signals }
    }

    /// Bring the link up and serve until interrupted.
    ///
    /// Transport failures restart the cycle after a short pause; only the
    /// role conflict returns an error.
    pub fn serve(&self) -> Result<()> {
        if proc_table::count_invocations("serve") > 1 {
            return Err(PtoError::RoleConflict {
                details: "Server can't run. A Server is running in this machine/device already"
                    .to_string(),
            });
        }
        loop {
            if self.signals.interrupted() {
                self.exit_by_signal(None);
            }
            if let Err(e) = self.serve_cycle() {
                match &e {
                    PtoError::Io { source, .. } => {
                        println!("Error [{}] : {e}", source.raw_os_error().unwrap_or(-1));
                    }
                    other => println!("Server error: {other}"),
                }
                println!("Restarting...");
                thread::sleep(Duration::from_secs(2));
            }
        }
    }

    fn serve_cycle(&self) -> Result<()> {
        netif::ensure_interface(&self.config.remote, &self.config.remote.server_ip)?;
        println!("Starting Server...");
        let addr = format!(
            "{}:{}",
            self.config.remote.server_ip, self.config.remote.server_port
        );
        let listener = TcpListener::bind(&addr).map_err(|e| PtoError::io(&addr, e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| PtoError::io(&addr, e))?;
        println!(
            "Listening on {}:{}",
            self.config.remote.server_ip, self.config.remote.server_port
        );

        loop {
            match listener.accept() {
                Ok((stream, _peer)) => {
                    if let Err(e) = self.handle_connection(stream, &listener) {
                        println!("Server error: {e}");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.signals.interrupted() {
                        self.exit_by_signal(None);
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(PtoError::io(&addr, e)),
            }
        }
    }

    /// One command, one connection.
    fn handle_connection(&self, mut stream: TcpStream, listener: &TcpListener) -> Result<()> {
        stream
            .set_nonblocking(false)
            .and_then(|()| self.bound_reads(&stream))
            .map_err(|e| PtoError::io("connection", e))?;

        let mut buf = [0u8; CHUNK_SIZE];
        let received = stream
            .read(&mut buf)
            .map_err(|e| PtoError::io("connection", e))?;
        if received == 0 {
            return Ok(());
        }
        let raw = String::from_utf8_lossy(&buf[..received]).into_owned();
        if self.signals.interrupted() {
            self.exit_by_signal(Some(&mut stream));
        }

        match Command::parse(&raw) {
            Command::Shell(cmd) => self.reply_shell(&mut stream, &cmd)?,
            Command::RunTest(name) => {
                self.stream_child(&mut stream, "Running Test...", &["run-test", &name], &[])?;
            }
            Command::RunProfile(name) => {
                self.stream_child(
                    &mut stream,
                    "Running Profile...",
                    &["run-profile", &name],
                    &[],
                )?;
            }
            Command::RunDefinition {
                definition,
                runmode,
                run_id,
                logs_dir,
            } => {
                let mut args: Vec<String> = vec![
                    "run-definition".to_string(),
                    "--definition".to_string(),
                    definition,
                    "--runmode".to_string(),
                    runmode,
                ];
                if !run_id.is_empty() {
                    args.extend(["--run-id".to_string(), run_id]);
                }
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                let envs: &[(&str, &str)] = if logs_dir.is_empty() {
                    &[]
                } else {
                    &[("PTO_LOGS_DIR", logs_dir.as_str())]
                };
                self.stream_child(&mut stream, "Running Custom Definition...", &arg_refs, envs)?;
            }
            Command::SendFile { name, ext, dest } => {
                self.receive_file(&mut stream, listener, &name, &ext, &dest)?;
            }
            Command::Help => write_line(&mut stream, HELP_MENU)?,
            Command::Malformed(reply) => write_line(&mut stream, reply)?,
            Command::Unknown => {
                stream
                    .write_all(b"Unknown command\n")
                    .map_err(|e| PtoError::io("connection", e))?;
            }
        }

        // The settle keeps the terminator in its own segment for the peer.
        thread::sleep(REPLY_SETTLE);
        let _ = stream.write_all(END_COMMAND.as_bytes());
        Ok(())
    }

    fn reply_shell(&self, stream: &mut TcpStream, cmd: &str) -> Result<()> {
        let out = run_shell(
            cmd,
            Some(Duration::from_secs(self.config.remote.shell_timeout_secs)),
        )?;
        write_line(stream, &format!("Return Code [{}]", out.code))?;
        write_line(stream, "Command Output:")?;
        write_line(stream, out.output.trim_end())?;
        Ok(())
    }

    /// Announce, then re-invoke this binary and relay its stdout line by line.
    fn stream_child(
        &self,
        stream: &mut TcpStream,
        banner: &str,
        args: &[&str],
        envs: &[(&str, &str)],
    ) -> Result<()> {
        write_line(stream, banner)?;
        let exe = std::env::current_exe().map_err(|e| PtoError::Runtime {
            details: format!("cannot locate own executable: {e}"),
        })?;
        let mut command = Process::new(exe);
        command.args(args).stdout(Stdio::piped());
        for (key, value) in envs {
            command.env(key, value);
        }
        let mut child = command.spawn().map_err(|e| PtoError::io(args[0], e))?;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line.map_err(|e| PtoError::io(args[0], e))?;
                write_line(stream, &line)?;
            }
        }
        let _ = child.wait();
        Ok(())
    }

    /// Second half of `SendFile`: ack on the command connection, then take
    /// the payload on the next accepted connection until the peer shuts
    /// down its write side.
    fn receive_file(
        &self,
        stream: &mut TcpStream,
        listener: &TcpListener,
        name: &str,
        ext: &str,
        dest: &str,
    ) -> Result<()> {
        let file_name = if ext.is_empty() {
            name.to_string()
        } else {
            format!("{name}.{ext}")
        };
        let path = Path::new(dest).join(file_name);
        let mut file = match std::fs::File::create(&path) {
            Ok(file) => file,
            Err(_) => {
                stream
                    .write_all(IMAGE_MODE_ERROR.as_bytes())
                    .map_err(|e| PtoError::io("connection", e))?;
                return Ok(());
            }
        };
        stream
            .write_all(IMAGE_MODE_OK.as_bytes())
            .map_err(|e| PtoError::io("connection", e))?;

        let mut upload = self.accept_upload(listener)?;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let received = upload
                .read(&mut buf)
                .map_err(|e| PtoError::io("upload", e))?;
            if received == 0 {
                break;
            }
            file.write_all(&buf[..received])
                .map_err(|e| PtoError::io(&path, e))?;
        }
        let _ = upload.write_all(END_COMMAND.as_bytes());
        Ok(())
    }

    fn accept_upload(&self, listener: &TcpListener) -> Result<TcpStream> {
        let deadline = Instant::now() + Duration::from_secs(self.config.remote.recv_timeout_secs);
        loop {
            match listener.accept() {
                Ok((stream, _peer)) => {
                    stream
                        .set_nonblocking(false)
                        .and_then(|()| self.bound_reads(&stream))
                        .map_err(|e| PtoError::io("upload", e))?;
                    return Ok(stream);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(PtoError::ProcessTimeout {
                            details: "upload connection never arrived".to_string(),
                        });
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(PtoError::io("upload", e)),
            }
        }
    }

    fn bound_reads(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_read_timeout(Some(Duration::from_secs(self.config.remote.recv_timeout_secs)))
    }

    fn exit_by_signal(&self, conn: Option<&mut TcpStream>) -> ! {
        let signal = self
            .signals
            .last_signal()
            .unwrap_or(signal_hook::consts::SIGINT);
        println!("Killed by signal [{signal}]");
        if let Some(stream) = conn {
            let _ = stream.write_all(SERVER_CLOSED.as_bytes());
        }
        std::process::exit(ExitStatus::BySignal.code());
    }
}

fn write_line(stream: &mut TcpStream, line: &str) -> Result<()> {
    stream
        .write_all(line.as_bytes())
        .and_then(|()| stream.write_all(b"\n"))
        .map_err(|e| PtoError::io("connection", e))
}
