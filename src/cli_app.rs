//! Top-level CLI definition and dispatch.

use std::env;
use std::io;
use std::path::PathBuf;

use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::control;
use thiserror::Error;

use process_test_orchestrator::core::config::Config;
use process_test_orchestrator::core::errors::PtoError;
use process_test_orchestrator::core::exit::ExitStatus;
use process_test_orchestrator::core::paths;
use process_test_orchestrator::core::signals::SignalState;
use process_test_orchestrator::dispatch::dispatcher::{Dispatcher, Plan, RunMode};
use process_test_orchestrator::guard::{self, WorkerContext};
use process_test_orchestrator::registry::bodies::BodyRegistry;
use process_test_orchestrator::registry::catalog::DefinitionCatalog;
use process_test_orchestrator::registry::definition::{Definition, UserMode};
use process_test_orchestrator::remote::client::RemoteClient;
use process_test_orchestrator::remote::server::RemoteServer;
use process_test_orchestrator::tools::{backup, validate};

/// Process Test Orchestrator. Runs declarative test definitions as batches
/// of supervised worker processes.
#[derive(Debug, Parser)]
#[command(
    name = "pto",
    author,
    version,
    about = "Process Test Orchestrator - declarative test runs as worker processes",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Mirror DEBUG-tagged log lines to the console.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Execute one test definition as a fresh run.
    RunTest(RunTestArgs),
    /// Execute every test a profile names, in slot order.
    RunProfile(RunProfileArgs),
    /// Execute a definition document given by file path.
    RunDefinition(RunDefinitionArgs),
    /// List the definitions the catalog knows about.
    Definitions(DefinitionsArgs),
    /// Recompute a run's directory checksum and compare it to the ledger.
    Validate(ValidateArgs),
    /// Archive a run directory into the backups folder.
    Backup(BackupArgs),
    /// Listen for commands on the point-to-point link.
    Serve(ServeArgs),
    /// Send a command or a file to a running listener.
    Send(SendArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
    /// Case worker entry point, spawned by the dispatcher.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Flags shared by every run-starting command.
#[derive(Debug, Clone, Args)]
struct RunOpts {
    /// Audience mode for the run.
    #[arg(long, value_name = "MODE", default_value = "automation")]
    usermode: String,
    /// Run mode: normal waits per case batch, parallel waits at the end.
    #[arg(long, value_name = "MODE", default_value = "normal")]
    runmode: String,
    /// Use a fixed run id instead of the next free one.
    #[arg(long, value_name = "ID")]
    run_id: Option<String>,
    /// Override the logs root for this run.
    #[arg(long, value_name = "PATH")]
    logs_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct RunTestArgs {
    /// Test definition name in the catalog.
    name: String,
    #[command(flatten)]
    run: RunOpts,
}

#[derive(Debug, Clone, Args)]
struct RunProfileArgs {
    /// Profile definition name in the catalog.
    name: String,
    #[command(flatten)]
    run: RunOpts,
}

#[derive(Debug, Clone, Args)]
struct RunDefinitionArgs {
    /// Path to a definition document of either kind.
    #[arg(long, value_name = "FILE")]
    definition: PathBuf,
    #[command(flatten)]
    run: RunOpts,
}

#[derive(Debug, Clone, Args)]
struct DefinitionsArgs {
    /// Only list definitions of this kind (test or profile).
    #[arg(long, value_name = "KIND")]
    kind: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct ValidateArgs {
    /// Run directory to validate.
    folder: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct BackupArgs {
    /// Run directory to archive.
    folder: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ServeArgs {
    /// Listen on this port instead of the configured one.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
}

#[derive(Debug, Clone, Args)]
#[command(group(
    ArgGroup::new("payload")
        .required(true)
        .args(["command", "file_from"]),
))]
struct SendArgs {
    /// Wire command to send verbatim, e.g. "ShellCommand:ls -l".
    #[arg(long, value_name = "CMD")]
    command: Option<String>,
    /// Local file to upload.
    #[arg(long, value_name = "PATH", requires = "file_to")]
    file_from: Option<PathBuf>,
    /// Directory on the peer the file lands in.
    #[arg(long, value_name = "DIR", requires = "file_from")]
    file_to: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

/// Worker argv contract. Positional order is fixed; the dispatcher and the
/// process-table scan both depend on it.
#[derive(Debug, Clone, Args)]
struct WorkerArgs {
    /// Parent test name.
    test: String,
    /// Case name within the test.
    case: String,
    /// Case execution mode (normal or concurrency).
    mode: String,
    /// Instance ordinal, 1-based.
    instance: u32,
    /// Run identifier.
    run_id: String,
    /// Logs root the run lives under.
    logs_dir: PathBuf,
    /// Order slot of the case within its test.
    order: u32,
}

/// CLI error type with the orchestrator's exit-code contract.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Failure surfaced from the orchestrator core.
    #[error("{0}")]
    Core(#[from] PtoError),
}

impl CliError {
    /// Process exit code: timeouts keep their own code, everything else is
    /// a general error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(PtoError::ProcessTimeout { .. }) => ExitStatus::Timeout.code(),
            Self::User(_) | Self::Core(_) => ExitStatus::Error.code(),
        }
    }
}

/// Dispatch CLI commands. The `Ok` payload is the process exit code, so
/// run outcomes pass through to the shell unchanged.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::RunTest(args) => run_test(cli, args),
        Command::RunProfile(args) => run_profile(cli, args),
        Command::RunDefinition(args) => run_definition(cli, args),
        Command::Definitions(args) => run_definitions(cli, args),
        Command::Validate(args) => run_validate(args),
        Command::Backup(args) => run_backup(cli, args),
        Command::Serve(args) => run_serve(cli, args),
        Command::Send(args) => run_send(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(0)
        }
        Command::Worker(args) => run_worker(cli, args),
    }
}

/// Config path resolution: explicit flag, then `PTO_CONFIG`, then default.
fn config_path(cli: &Cli) -> Option<PathBuf> {
    cli.config
        .clone()
        .or_else(|| env::var_os("PTO_CONFIG").map(PathBuf::from))
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(config_path(cli).as_deref())?;
    if cli.verbose {
        config.log.debug = true;
    }
    Ok(config)
}

/// Parse the usermode and refuse the ones that have no runner yet.
fn usermode_gate(raw: &str) -> Result<UserMode, CliError> {
    let mode: UserMode = raw.parse()?;
    if mode == UserMode::Automation {
        Ok(mode)
    } else {
        Err(CliError::User(format!(
            "ERROR: User Mode [ {mode} ] - Not supported yet"
        )))
    }
}

fn run_options(cli: &Cli, opts: &RunOpts) -> Result<(Config, UserMode, RunMode), CliError> {
    let mut config = load_config(cli)?;
    if let Some(dir) = &opts.logs_dir {
        config.paths.logs_dir = dir.clone();
    }
    let usermode = usermode_gate(&opts.usermode)?;
    let run_mode: RunMode = opts.runmode.parse()?;
    Ok((config, usermode, run_mode))
}

fn run_test(cli: &Cli, args: &RunTestArgs) -> Result<i32, CliError> {
    let (config, usermode, run_mode) = run_options(cli, &args.run)?;
    let catalog = DefinitionCatalog::new(&config.paths.definitions_dir);
    let test = catalog.load_test(&args.name)?;
    let mut dispatcher = Dispatcher::new(
        config,
        usermode,
        run_mode,
        args.run.run_id.clone(),
        SignalState::install(),
    )?;
    Ok(dispatcher.run(&Plan::Test(test))?)
}

fn run_profile(cli: &Cli, args: &RunProfileArgs) -> Result<i32, CliError> {
    let (config, usermode, run_mode) = run_options(cli, &args.run)?;
    let catalog = DefinitionCatalog::new(&config.paths.definitions_dir);
    let profile = catalog.load_profile(&args.name)?;
    let tests = catalog.resolve_profile(&profile)?;
    let mut dispatcher = Dispatcher::new(
        config,
        usermode,
        run_mode,
        args.run.run_id.clone(),
        SignalState::install(),
    )?;
    Ok(dispatcher.run(&Plan::Profile { profile, tests })?)
}

fn run_definition(cli: &Cli, args: &RunDefinitionArgs) -> Result<i32, CliError> {
    let (mut config, usermode, run_mode) = run_options(cli, &args.run)?;
    let document = DefinitionCatalog::load_from_path(&args.definition)?;
    let stem = args
        .definition
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem != document.name() {
        return Err(CliError::User(format!(
            "definition file [ {} ] must be named after its definition [ {} ]",
            args.definition.display(),
            document.name()
        )));
    }
    // Workers re-resolve their case slot by test name, so the document's
    // directory serves as the catalog for this run. Made absolute so spawned
    // workers resolve it regardless of their working directory.
    let document_path = paths::resolve_absolute_path(&args.definition);
    if let Some(parent) = document_path.parent() {
        config.paths.definitions_dir = parent.to_path_buf();
    }
    let catalog = DefinitionCatalog::new(&config.paths.definitions_dir);
    let plan = match document {
        Definition::Test(test) => Plan::Test(test),
        Definition::Profile(profile) => {
            let tests = catalog.resolve_profile(&profile)?;
            Plan::Profile { profile, tests }
        }
    };
    let mut dispatcher = Dispatcher::new(
        config,
        usermode,
        run_mode,
        args.run.run_id.clone(),
        SignalState::install(),
    )?;
    Ok(dispatcher.run(&plan)?)
}

fn run_definitions(cli: &Cli, args: &DefinitionsArgs) -> Result<i32, CliError> {
    if let Some(kind) = &args.kind {
        if kind != "test" && kind != "profile" {
            return Err(CliError::User(format!(
                "unknown definition kind [ {kind} ], expected test or profile"
            )));
        }
    }
    let config = load_config(cli)?;
    let catalog = DefinitionCatalog::new(&config.paths.definitions_dir);
    let mut rows = catalog.list()?;
    if let Some(kind) = &args.kind {
        rows.retain(|row| row.kind == kind);
    }
    if rows.is_empty() {
        println!(
            "No definitions under [ {} ]",
            config.paths.definitions_dir.display()
        );
        return Ok(0);
    }
    println!("{:<9} {:<28} DESCRIPTION", "TYPE", "NAME");
    for row in rows {
        println!("{:<9} {:<28} {}", row.kind, row.name, row.descp);
    }
    Ok(0)
}

fn run_validate(args: &ValidateArgs) -> Result<i32, CliError> {
    let valid = validate::validate_run(&args.folder)?;
    Ok(i32::from(!valid))
}

fn run_backup(cli: &Cli, args: &BackupArgs) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    let archived = backup::backup_run(&config, &args.folder)?;
    Ok(i32::from(!archived))
}

fn run_serve(cli: &Cli, args: &ServeArgs) -> Result<i32, CliError> {
    let mut config = load_config(cli)?;
    if let Some(port) = args.port {
        config.remote.server_port = port;
    }
    let server = RemoteServer::new(config, SignalState::install());
    server.serve()?;
    Ok(0)
}

fn run_send(cli: &Cli, args: &SendArgs) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    let client = RemoteClient::new(config, SignalState::install());
    let code = if let Some(command) = &args.command {
        client.send_command(command)?
    } else {
        let source = args
            .file_from
            .as_deref()
            .ok_or_else(|| CliError::User("--file-from is required to send a file".to_string()))?;
        let dest = args
            .file_to
            .as_deref()
            .ok_or_else(|| CliError::User("--file-to is required to send a file".to_string()))?;
        client.send_file(source, dest)?
    };
    Ok(code)
}

fn run_worker(cli: &Cli, args: &WorkerArgs) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    let ctx = WorkerContext {
        test: args.test.clone(),
        case: args.case.clone(),
        mode: args.mode.clone(),
        instance: args.instance,
        run_id: args.run_id.clone(),
        logs_dir: args.logs_dir.clone(),
        order: args.order,
    };
    let registry = BodyRegistry::with_builtins();
    guard::run(&config, &ctx, &registry)
}
