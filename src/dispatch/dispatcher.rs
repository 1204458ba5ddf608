//! Expands a test or profile into batches of worker processes.
//!
//! Each case slot becomes `concurrency_inst` worker processes of this same
//! binary, spawned one second apart. Sequentially the dispatcher waits for
//! each case batch before the next; in parallel it launches everything and
//! waits once per test. A batch passes only when every worker exited zero,
//! and the run passes only when every batch did.
//!
//! On interruption the dispatcher kills unprotected workers outright and
//! sends protected ones a cooperative interrupt, then leaves. If protected
//! workers remain, the last of them closes the ledger; otherwise the
//! dispatcher closes it on the way out.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::coord::counter::ExitCounter;
use crate::coord::flag::ParallelFlag;
use crate::core::config::Config;
use crate::core::errors::{PtoError, Result};
use crate::core::exit::{ExitStatus, exit_message};
use crate::core::paths;
use crate::core::signals::SignalState;
use crate::dispatch::proc_table;
use crate::ledger::checksum::run_directory_checksum;
use crate::ledger::store::{LedgerStore, Mutation};
use crate::registry::definition::{CaseSpec, ProfileDefinition, TestDefinition, UserMode};
use crate::runlog::{RunLogger, SEPARATOR, Status, Tag, timestamp_now};

/// Whether case batches run back to back or all at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Sequential,
    Parallel,
}

impl RunMode {
    #[must_use]
    pub const fn is_parallel(self) -> bool {
        matches!(self, Self::Parallel)
    }
}

impl FromStr for RunMode {
    type Err = PtoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "0" => Ok(Self::Sequential),
            "parallel" | "1" => Ok(Self::Parallel),
            _ => Err(PtoError::Runtime {
                details: format!("ERROR: Run Mode [ {s} ] - Not supported"),
            }),
        }
    }
}

/// What one run executes: a single test, or a profile's resolved tests.
pub enum Plan {
    Test(TestDefinition),
    Profile {
        profile: ProfileDefinition,
        tests: Vec<(u32, TestDefinition)>,
    },
}

#[derive(Debug)]
struct WorkerRecord {
    child: Child,
    pid: i32,
    protected: bool,
    exit_code: Option<i32>,
}

/// Drives one run from id allocation to the closing checksum.
#[derive(Debug)]
pub struct Dispatcher {
    config: Config,
    usermode: UserMode,
    run_mode: RunMode,
    run_id: String,
    run_dir: PathBuf,
    logger: RunLogger,
    ledger: LedgerStore,
    counter: ExitCounter,
    flag: ParallelFlag,
    signals: SignalState,
    workers: Vec<WorkerRecord>,
    exit_codes: Vec<i32>,
}

impl Dispatcher {
    /// Allocate the run identity, create its directory, and seed the ledger.
    ///
    /// A custom id whose directory already exists fails here, before any
    /// side effect.
    pub fn new(
        config: Config,
        usermode: UserMode,
        run_mode: RunMode,
        custom_id: Option<String>,
        signals: SignalState,
    ) -> Result<Self> {
        let run_id = match custom_id {
            Some(id) => {
                let dir = paths::run_dir(&config.paths.logs_dir, &id);
                if dir.exists() {
                    return Err(PtoError::RunIdCollision { path: dir });
                }
                id
            }
            None => proc_table::next_run_id(&config.paths.logs_dir)?,
        };
        let run_dir = paths::run_dir(&config.paths.logs_dir, &run_id);
        let logger = RunLogger::for_run(&config.paths.logs_dir, &run_id, config.log.debug)?;
        let ledger = LedgerStore::new(&run_dir, &run_id, &config.locks);
        ledger.initialize()?;
        let counter = ExitCounter::new(&run_dir, &config.locks);
        let flag = ParallelFlag::new(&run_dir);

        Ok(Self {
            config,
            usermode,
            run_mode,
            run_id,
            run_dir,
            logger,
            ledger,
            counter,
            flag,
            signals,
            workers: Vec::new(),
            exit_codes: Vec::new(),
        })
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Execute the plan to completion.
    ///
    /// Returns the aggregate code: `0` when every batch passed, `1` when any
    /// worker failed. Interruption does not return; see [`Self::stop`].
    pub fn run(&mut self, plan: &Plan) -> Result<i32> {
        self.logger.log(
            &format!("[[ {} ]] - Executor", std::process::id()),
            Tag::Debug,
        );
        self.ledger.record(Mutation::StartDate(timestamp_now()))?;
        self.ledger
            .record(Mutation::Mode(self.usermode.as_str().to_string()))?;

        match plan {
            Plan::Test(test) => {
                self.ledger.record(Mutation::ResetTestExecution)?;
                self.start_test(test)?;
            }
            Plan::Profile { profile, tests } => {
                self.ledger.record(Mutation::Profile(profile.name.clone()))?;
                self.ledger.record(Mutation::ResetTestExecution)?;
                for (_, test) in tests {
                    self.start_test(test)?;
                }
            }
        }

        self.ledger.record(Mutation::EndDate(timestamp_now()))?;
        let code = aggregate_code(&self.exit_codes);

        self.logger.log_show(SEPARATOR, Tag::Info);
        if code == 0 {
            self.logger.log_show_with(
                &format!(
                    "Execution finished!: TEST ID [ {} ] ends without error(s)",
                    self.run_id
                ),
                Tag::Passed,
                Status::Ok,
            );
        } else {
            self.logger.log_show_with(
                &format!(
                    "Execution finished!: TEST ID [ {} ] ends with error(s)",
                    self.run_id
                ),
                Tag::Failed,
                Status::Wrong,
            );
        }
        self.ledger.record(Mutation::ExitStatus(code))?;
        self.ledger
            .record(Mutation::ExitMessage(exit_message(code).to_string()))?;
        self.logger.log_show(SEPARATOR, Tag::Info);

        let checksum = run_directory_checksum(&self.run_dir, &self.run_id)?;
        self.ledger.record(Mutation::Checksum(checksum))?;
        Ok(code)
    }

    fn start_test(&mut self, test: &TestDefinition) -> Result<()> {
        self.logger.log_show(SEPARATOR, Tag::Info);
        self.logger.log_show(SEPARATOR, Tag::Info);
        self.logger.log_show(&centered_banner(&test.name), Tag::Info);
        self.logger.log_show(SEPARATOR, Tag::Info);

        if !test.runs_under(self.usermode) {
            self.logger.log_show_with(
                &format!(
                    "Test [{}] is not configured to run in current usermode [{}]",
                    test.name, self.usermode
                ),
                Tag::Warning,
                Status::Warn,
            );
            return Ok(());
        }

        self.ledger.record(Mutation::InitTestList(test.name.clone()))?;

        for (order, spec) in test.ordered_cases()? {
            if self.signals.interrupted() {
                self.stop();
            }
            for instance in 1..=spec.concurrency_inst {
                self.spawn_worker(&test.name, spec, order, instance)?;
                thread::sleep(Duration::from_secs(1));
            }
            if !self.run_mode.is_parallel() {
                self.wait_batch();
            }
        }
        if self.run_mode.is_parallel() {
            self.wait_batch();
        }
        Ok(())
    }

    fn spawn_worker(
        &mut self,
        test: &str,
        spec: &CaseSpec,
        order: u32,
        instance: u32,
    ) -> Result<()> {
        let exe = std::env::current_exe().map_err(|e| PtoError::Runtime {
            details: format!("cannot locate own executable: {e}"),
        })?;
        let args = worker_args(
            test,
            &spec.name,
            spec.mode.as_str(),
            instance,
            &self.run_id,
            &self.config.paths.logs_dir,
            order,
        );
        let child = Command::new(&exe)
            .args(&args)
            .env("PTO_LOGS_DIR", &self.config.paths.logs_dir)
            .env("PTO_DEFINITIONS_DIR", &self.config.paths.definitions_dir)
            .env(
                "PTO_LOCK_ACQUIRE_TIMEOUT_SECS",
                self.config.locks.acquire_timeout_secs.to_string(),
            )
            .env(
                "PTO_LOCK_POLL_INTERVAL_MS",
                self.config.locks.poll_interval_ms.to_string(),
            )
            .env("PTO_LOG_DEBUG", if self.config.log.debug { "1" } else { "0" })
            .spawn()
            .map_err(|e| PtoError::io(&exe, e))?;

        self.logger.log(
            &format!(
                "[ {} ] -> {{ {} }} - To run process for: {}",
                std::process::id(),
                child.id(),
                args.join(" ")
            ),
            Tag::Debug,
        );
        let pid = i32::try_from(child.id()).unwrap_or(i32::MAX);
        self.workers.push(WorkerRecord {
            child,
            pid,
            protected: spec.protected,
            exit_code: None,
        });
        Ok(())
    }

    /// Reap every worker in the current batch and fold their codes into one
    /// pass/fail entry. Interruption during the wait does not return.
    fn wait_batch(&mut self) {
        let pids: Vec<i32> = self.workers.iter().map(|w| w.pid).collect();
        self.logger.log(
            &format!("[ {} ] - Process List to wait: {pids:?}", std::process::id()),
            Tag::Debug,
        );

        while self.workers.iter().any(|w| w.exit_code.is_none()) {
            if self.signals.interrupted() {
                self.stop();
            }
            for worker in &mut self.workers {
                if worker.exit_code.is_some() {
                    continue;
                }
                match worker.child.try_wait() {
                    Ok(Some(status)) => {
                        worker.exit_code = Some(unix_exit_code(&status));
                        worker.protected = false;
                    }
                    Ok(None) => {}
                    Err(_) => {
                        worker.exit_code = Some(1);
                        worker.protected = false;
                    }
                }
            }
            thread::sleep(Duration::from_millis(100));
        }

        let codes: Vec<i32> = self.workers.iter().filter_map(|w| w.exit_code).collect();
        self.logger.log(
            &format!(
                "[ {} ] - Process(es) Exit Code(s): {codes:?}",
                std::process::id()
            ),
            Tag::Debug,
        );
        self.exit_codes.push(aggregate_code(&codes));
        self.workers.clear();
    }

    /// React to an interruption and leave with the by-signal code.
    ///
    /// Unprotected workers are killed; protected ones get a cooperative
    /// interrupt and stay responsible for the ledger footer. Only when no
    /// protected worker remains does the dispatcher write the footer itself.
    fn stop(&self) -> ! {
        let signal = self
            .signals
            .last_signal()
            .unwrap_or(signal_hook::consts::SIGINT);
        self.logger
            .log_show(&format!("SIGNAL Received: {signal}"), Tag::Warning);
        self.logger
            .log_show("Interrupting processes running...", Tag::Warning);
        let pids: Vec<i32> = self.workers.iter().map(|w| w.pid).collect();
        self.logger.log(
            &format!("[ {} ] - Process List: {pids:?}", std::process::id()),
            Tag::Debug,
        );

        if let Err(e) = self.counter.initialize() {
            self.logger
                .log_show(&format!("Exit counter setup failed: {e}"), Tag::Error);
        }
        if self.run_mode.is_parallel() {
            if let Err(e) = self.flag.set() {
                self.logger
                    .log_show(&format!("Parallel flag setup failed: {e}"), Tag::Error);
            }
        }

        let mut outcome = 0u8;
        for worker in &self.workers {
            if worker.protected {
                self.logger.log_show(
                    &format!("! Protected PID {} - waiting to finish...", worker.pid),
                    Tag::Warning,
                );
                self.send_signal(worker.pid, nix::sys::signal::Signal::SIGINT);
                if self.run_mode.is_parallel() {
                    if let Err(e) = self.counter.adjust(1) {
                        self.logger
                            .log_show(&format!("Exit counter adjust failed: {e}"), Tag::Error);
                    }
                }
                outcome |= 2;
            } else {
                self.logger
                    .log_show(&format!("* Killing PID: {}", worker.pid), Tag::Warning);
                self.send_signal(worker.pid, nix::sys::signal::Signal::SIGKILL);
                thread::sleep(Duration::from_secs(1));
                outcome |= 1;
            }
        }

        if outcome == 1 || self.workers.is_empty() {
            self.counter.remove();
            if self.run_mode.is_parallel() {
                self.flag.clear();
            }
            self.finalize_interrupted();
        }
        std::process::exit(ExitStatus::BySignal.code());
    }

    fn send_signal(&self, pid: i32, signal: nix::sys::signal::Signal) {
        if let Err(e) = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), signal) {
            if e == nix::errno::Errno::ESRCH {
                self.logger
                    .log_show(&format!("No such process [ {pid} ]"), Tag::Warning);
            } else {
                self.logger
                    .log_show(&format!("Signal {signal} to {pid} failed: {e}"), Tag::Error);
            }
        }
    }

    fn finalize_interrupted(&self) {
        let by_signal = ExitStatus::BySignal;
        for mutation in [
            Mutation::EndDate(timestamp_now()),
            Mutation::ExitStatus(by_signal.code()),
            Mutation::ExitMessage(by_signal.message().to_string()),
        ] {
            if let Err(e) = self.ledger.record(mutation) {
                self.logger
                    .log_show(&format!("Ledger write failed: {e}"), Tag::Error);
            }
        }
        match run_directory_checksum(&self.run_dir, &self.run_id) {
            Ok(checksum) => {
                if let Err(e) = self.ledger.record(Mutation::Checksum(checksum)) {
                    self.logger
                        .log_show(&format!("Ledger write failed: {e}"), Tag::Error);
                }
            }
            Err(e) => {
                self.logger
                    .log_show(&format!("Checksum failed: {e}"), Tag::Error);
            }
        }
    }
}

/// The fixed worker argv, minus the binary itself.
fn worker_args(
    test: &str,
    case: &str,
    mode: &str,
    instance: u32,
    run_id: &str,
    logs_dir: &Path,
    order: u32,
) -> [String; 8] {
    [
        "worker".to_string(),
        test.to_string(),
        case.to_string(),
        mode.to_string(),
        instance.to_string(),
        run_id.to_string(),
        logs_dir.display().to_string(),
        order.to_string(),
    ]
}

/// Fold exit codes into one verdict: `0` when every code is zero, `1`
/// otherwise. An empty slice passes.
#[must_use]
pub fn aggregate_code(codes: &[i32]) -> i32 {
    i32::from(codes.iter().any(|c| *c != 0))
}

fn centered_banner(name: &str) -> String {
    format!("{:^53}", format!("[ {name} ]"))
}

fn unix_exit_code(status: &std::process::ExitStatus) -> i32 {
    status
        .code()
        .map_or_else(|| status.signal().map_or(1, |s| 128 + s), |code| code)
}
