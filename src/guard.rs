//! The per-case worker harness.
//!
//! Every worker process runs exactly one case instance through the same
//! sequence: resolve the case slot and its body, write the header, pass the
//! mode and instance gates, time the body, then write the footer and the
//! ledger entry before exiting with the body's code.
//!
//! Interruption changes the ending. An unprotected worker records a
//! by-signal entry and leaves with the signal code. A protected worker
//! finishes its body first, records its real result, and then takes part in
//! the last-one-out accounting: in parallel runs the exit counter was
//! pre-credited by the dispatcher and every leaver takes one down, in
//! sequential runs leavers count up toward the instance total. Whoever
//! observes the terminal count, or sees no sibling still alive, closes the
//! run ledger on the way out.

use std::path::PathBuf;
use std::process;

use crate::coord::counter::ExitCounter;
use crate::coord::flag::ParallelFlag;
use crate::core::config::Config;
use crate::core::errors::{PtoError, Result};
use crate::core::exit::{ExitStatus, exit_message};
use crate::core::paths;
use crate::core::signals::SignalState;
use crate::dispatch::proc_table;
use crate::ledger::checksum::run_directory_checksum;
use crate::ledger::document::CaseEntry;
use crate::ledger::store::{LedgerStore, Mutation};
use crate::registry::bodies::{BodyContext, BodyRegistry};
use crate::registry::catalog::DefinitionCatalog;
use crate::registry::definition::CaseSpec;
use crate::runlog::{RunLogger, SEPARATOR, Status, Tag, timestamp_now};

/// The fixed argv contract a worker is spawned with.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub test: String,
    pub case: String,
    pub mode: String,
    pub instance: u32,
    pub run_id: String,
    pub logs_dir: PathBuf,
    pub order: u32,
}

/// Run one case instance to its exit. Never returns.
pub fn run(config: &Config, ctx: &WorkerContext, registry: &BodyRegistry) -> ! {
    let signals = SignalState::install();

    let (run_logger, case_logger) = match loggers(config, ctx) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("[PTO-WORKER] log setup failed: {e}");
            process::exit(ExitStatus::Error.code());
        }
    };

    let catalog = DefinitionCatalog::new(&config.paths.definitions_dir);
    let test_def = match catalog.load_test(&ctx.test) {
        Ok(def) => def,
        Err(e) => {
            case_logger.log_show_with(&e.to_string(), Tag::Error, Status::Wrong);
            process::exit(ExitStatus::Error.code());
        }
    };
    let Some(spec) = test_def.case_by(&ctx.case, ctx.order) else {
        case_logger.log_show_with(
            &format!(
                "Test case [ {} ] with order [ {} ] not found in test [ {} ]",
                ctx.case, ctx.order, ctx.test
            ),
            Tag::Error,
            Status::Wrong,
        );
        process::exit(ExitStatus::Error.code());
    };
    let Some(body) = registry.get(&ctx.case) else {
        case_logger.log_show_with(
            &format!("Test case [ {} ] not registered", ctx.case),
            Tag::Error,
            Status::Wrong,
        );
        case_logger.show(
            &format!("Registered [ {} ]", registry.names().join(", ")),
            Tag::Info,
        );
        process::exit(ExitStatus::Error.code());
    };

    for line in header_lines(ctx, spec) {
        run_logger.log(&line, Tag::Info);
        case_logger.log_show(&line, Tag::Info);
    }

    if spec.mode.as_str() != ctx.mode {
        let err = PtoError::ModeMismatch {
            requested: ctx.mode.clone(),
            configured: spec.mode.to_string(),
        };
        case_logger.log_show_with(&err.to_string(), Tag::Error, Status::Wrong);
        process::exit(ExitStatus::Error.code());
    }

    // Advisory gate: the scan includes this process itself.
    let live = proc_table::count_workers(&ctx.test, Some(&ctx.case));
    if live > spec.concurrency_inst as usize {
        let err = PtoError::ConcurrencyLimit {
            test: ctx.test.clone(),
            case: ctx.case.clone(),
            limit: spec.concurrency_inst,
        };
        case_logger.log_show_with(&err.to_string(), Tag::Error, Status::Wrong);
        process::exit(ExitStatus::Error.code());
    }

    case_logger.log_show("Starting testcase...", Tag::Info);

    let run_dir = paths::run_dir(&ctx.logs_dir, &ctx.run_id);
    let parameters = spec.args.clone().unwrap_or_default();
    let user_args = spec.user_args();
    let start_date = timestamp_now();
    let rc = body(&BodyContext {
        logger: &case_logger,
        signals: &signals,
        run_dir: &run_dir,
        test: &ctx.test,
        case: &ctx.case,
        instance: ctx.instance,
        args: &user_args,
    });
    let end_date = timestamp_now();

    let ledger = LedgerStore::new(&run_dir, &ctx.run_id, &config.locks);

    if signals.interrupted() {
        if spec.protected {
            case_logger.log_show("Test case protected - Waiting to finish...", Tag::Warning);
        } else {
            let signal = signals.last_signal().unwrap_or(signal_hook::consts::SIGINT);
            case_logger.log_show(
                &format!(
                    "SIGNAL Received: {signal} in test: [ {} ] - test case [ {} ] - instance [ {} ]",
                    ctx.test, ctx.case, ctx.instance
                ),
                Tag::Warning,
            );
            case_logger.log_show("Interrupting Test(s) running...", Tag::Warning);
            let by_signal = ExitStatus::BySignal.code();
            let entry = case_entry(ctx, &parameters, &start_date, &timestamp_now(), by_signal);
            record_entry(&ledger, &ctx.test, entry, &case_logger);
            process::exit(by_signal);
        }
    }

    for line in footer_lines(ctx, &parameters, rc) {
        run_logger.log(&line, Tag::Info);
        case_logger.log_show(&line, Tag::Info);
    }
    let entry = case_entry(ctx, &parameters, &start_date, &end_date, rc);
    record_entry(&ledger, &ctx.test, entry, &case_logger);

    if signals.interrupted() && spec.protected {
        last_one_out(config, ctx, spec, &ledger, &case_logger);
    }
    process::exit(rc);
}

/// The worker's share of a protected shutdown.
///
/// Adjusts the durable exit counter under its lock, then decides whether
/// this worker is the last to leave. The coordination files go away before
/// the footer so the recorded checksum never covers them.
fn last_one_out(
    config: &Config,
    ctx: &WorkerContext,
    spec: &CaseSpec,
    ledger: &LedgerStore,
    logger: &RunLogger,
) {
    let run_dir = paths::run_dir(&ctx.logs_dir, &ctx.run_id);
    let counter = ExitCounter::new(&run_dir, &config.locks);
    let flag = ParallelFlag::new(&run_dir);
    let parallel = flag.is_set();

    let count = match counter.adjust(if parallel { -1 } else { 1 }) {
        Ok(count) => count,
        Err(e) => {
            logger.log_show(&format!("Exit counter adjust failed: {e}"), Tag::Error);
            counter.read()
        }
    };
    let alive = i64::try_from(proc_table::count_workers(&ctx.test, None)).unwrap_or(i64::MAX) - 1;
    logger.log(
        &format!("Exit Counter: [ {count} ] - Processes Alive: [ {alive} ]"),
        Tag::Debug,
    );

    if !is_last_one_out(parallel, count, i64::from(spec.concurrency_inst), alive) {
        return;
    }

    counter.remove();
    if parallel {
        flag.clear();
    }

    let by_signal = ExitStatus::BySignal;
    for mutation in [
        Mutation::EndDate(timestamp_now()),
        Mutation::ExitStatus(by_signal.code()),
        Mutation::ExitMessage(by_signal.message().to_string()),
    ] {
        if let Err(e) = ledger.record(mutation) {
            logger.log_show(&format!("Ledger write failed: {e}"), Tag::Error);
        }
    }
    match run_directory_checksum(&run_dir, &ctx.run_id) {
        Ok(checksum) => {
            if let Err(e) = ledger.record(Mutation::Checksum(checksum)) {
                logger.log_show(&format!("Ledger write failed: {e}"), Tag::Error);
            }
        }
        Err(e) => logger.log_show(&format!("Checksum failed: {e}"), Tag::Error),
    }
}

/// Whether the leaver observing these values closes the run.
///
/// `alive_minus_self` of zero means no sibling worker remains, which ends
/// the run regardless of what the counter says.
const fn is_last_one_out(parallel: bool, counter: i64, cinst: i64, alive_minus_self: i64) -> bool {
    if alive_minus_self <= 0 {
        return true;
    }
    if parallel { counter <= 0 } else { counter >= cinst }
}

fn loggers(config: &Config, ctx: &WorkerContext) -> Result<(RunLogger, RunLogger)> {
    let run_logger = RunLogger::for_run(&ctx.logs_dir, &ctx.run_id, config.log.debug)?;
    let case_logger = RunLogger::for_case(
        &ctx.logs_dir,
        &ctx.run_id,
        &ctx.test,
        &ctx.case,
        ctx.instance,
        config.log.debug,
    )?;
    Ok((run_logger, case_logger))
}

fn header_lines(ctx: &WorkerContext, spec: &CaseSpec) -> [String; 9] {
    [
        SEPARATOR.to_string(),
        format!("TEST ID [ {} ]", ctx.run_id),
        format!("Entering Test [ {} ]", ctx.test),
        format!("Test Case [ {} ]", ctx.case),
        format!("Order [ {} ]", ctx.order),
        format!("Parameters [ {} ]", spec.args.clone().unwrap_or_default()),
        format!("Mode [ {} ]", ctx.mode),
        format!("Description [ {} ]", spec.descp),
        format!("Instance No. [ {} ]", ctx.instance),
    ]
}

fn footer_lines(ctx: &WorkerContext, parameters: &str, rc: i32) -> [String; 6] {
    [
        format!("Exited Test [ {} ]", ctx.test),
        format!("Test Case [ {} ]", ctx.case),
        format!("Parameters [ {parameters} ]"),
        format!("Instance No. [ {} ]", ctx.instance),
        format!("Return Code [ {rc} ]"),
        SEPARATOR.to_string(),
    ]
}

fn case_entry(
    ctx: &WorkerContext,
    parameters: &str,
    start_date: &str,
    end_date: &str,
    rc: i32,
) -> CaseEntry {
    CaseEntry {
        order_exec: ctx.order,
        method: ctx.case.clone(),
        parameters: parameters.to_string(),
        start_date: start_date.to_string(),
        end_date: end_date.to_string(),
        method_mode: ctx.mode.clone(),
        concurrency_inst: ctx.instance,
        exit_status: rc,
        exit_msg: exit_message(rc).to_string(),
    }
}

fn record_entry(ledger: &LedgerStore, test: &str, entry: CaseEntry, logger: &RunLogger) {
    if let Err(e) = ledger.record(Mutation::AppendCaseEntry {
        test: test.to_string(),
        entry,
    }) {
        logger.log_show(&format!("Ledger write failed: {e}"), Tag::Error);
    }
}
