//! Compiled-in case bodies.
//!
//! A body is a plain function a worker process runs once per instance. The
//! registry maps case names to bodies so a worker fails cleanly on a case
//! nothing implements instead of dispatching into the dark. Bodies poll the
//! shared signal flags and return a process exit code; the worker harness
//! owns timing, logging and the exit itself.

use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::signals::SignalState;
use crate::runlog::{RunLogger, Status, Tag};

/// Everything a body may touch while it runs.
pub struct BodyContext<'a> {
    pub logger: &'a RunLogger,
    pub signals: &'a SignalState,
    pub run_dir: &'a Path,
    pub test: &'a str,
    pub case: &'a str,
    pub instance: u32,
    pub args: &'a [String],
}

/// A case body: runs to completion, returns the worker exit code.
pub type CaseBody = fn(&BodyContext<'_>) -> i32;

/// Named lookup of case bodies.
pub struct BodyRegistry {
    bodies: BTreeMap<String, CaseBody>,
}

impl BodyRegistry {
    /// Registry carrying the built-in bodies.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            bodies: BTreeMap::new(),
        };
        registry.register("sleep_then_pass", sleep_then_pass);
        registry.register("sleep_then_fail", sleep_then_fail);
        registry.register("await_interrupt", await_interrupt);
        registry.register("emit_marker", emit_marker);
        registry
    }

    pub fn register(&mut self, name: &str, body: CaseBody) {
        self.bodies.insert(name.to_string(), body);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<CaseBody> {
        self.bodies.get(name).copied()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.bodies.keys().map(String::as_str).collect()
    }
}

impl Default for BodyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Value of `key=value` inside a body's argument list.
#[must_use]
pub fn arg_value<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
    args.iter()
        .find_map(|arg| arg.split_once('=').filter(|(k, _)| *k == key).map(|(_, v)| v))
}

fn arg_f64(args: &[String], key: &str, default: f64) -> f64 {
    arg_value(args, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn arg_i32(args: &[String], key: &str, default: i32) -> i32 {
    arg_value(args, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Sleep in short slices so an interruption is noticed promptly.
/// Returns true when the wait ended early because of a signal.
fn cooperative_sleep(signals: &SignalState, duration: Duration) -> bool {
    let slice = Duration::from_millis(50);
    let started = Instant::now();
    while started.elapsed() < duration {
        if signals.interrupted() {
            return true;
        }
        let remaining = duration.saturating_sub(started.elapsed());
        thread::sleep(remaining.min(slice));
    }
    signals.interrupted()
}

// ──────────────────── built-in bodies ────────────────────

/// Sleeps for `duration=` seconds (default 1), then passes.
fn sleep_then_pass(ctx: &BodyContext<'_>) -> i32 {
    let duration = Duration::from_secs_f64(arg_f64(ctx.args, "duration", 1.0));
    ctx.logger.log_show(
        &format!(
            "[ {} ] instance {} working for {:.1}s",
            ctx.case,
            ctx.instance,
            duration.as_secs_f64()
        ),
        Tag::Info,
    );
    cooperative_sleep(ctx.signals, duration);
    ctx.logger.log_show_with(
        &format!("[ {} ] instance {} finished", ctx.case, ctx.instance),
        Tag::Success,
        Status::Ok,
    );
    0
}

/// Sleeps for `duration=` seconds (default 1), then fails with `rc=` (default 1).
fn sleep_then_fail(ctx: &BodyContext<'_>) -> i32 {
    let duration = Duration::from_secs_f64(arg_f64(ctx.args, "duration", 1.0));
    let rc = arg_i32(ctx.args, "rc", 1);
    cooperative_sleep(ctx.signals, duration);
    ctx.logger.log_show_with(
        &format!("[ {} ] instance {} failed with rc {rc}", ctx.case, ctx.instance),
        Tag::Error,
        Status::Wrong,
    );
    rc
}

/// Runs until interrupted, up to a `duration=` cap (default 30s).
///
/// Meant for protected cases: on interruption it wraps up on its own and
/// reports success, exercising the cooperative stop path.
fn await_interrupt(ctx: &BodyContext<'_>) -> i32 {
    let cap = Duration::from_secs_f64(arg_f64(ctx.args, "duration", 30.0));
    ctx.logger.log_show(
        &format!("[ {} ] instance {} waiting for interruption", ctx.case, ctx.instance),
        Tag::Info,
    );
    if cooperative_sleep(ctx.signals, cap) {
        ctx.logger.log_show_with(
            &format!("[ {} ] instance {} interrupted, wrapping up", ctx.case, ctx.instance),
            Tag::Warning,
            Status::Warn,
        );
    }
    0
}

/// Drops a marker file into the run directory so a run leaves visible work.
fn emit_marker(ctx: &BodyContext<'_>) -> i32 {
    let default_name = format!("{}_{}.marker", ctx.case, ctx.instance);
    let name = arg_value(ctx.args, "file").unwrap_or(&default_name);
    let path = ctx.run_dir.join(name);
    let content = format!("{} instance {}\n", ctx.case, ctx.instance);
    if let Err(e) = std::fs::write(&path, content) {
        ctx.logger.log_show_with(
            &format!("[ {} ] marker write failed: {e}", ctx.case),
            Tag::Error,
            Status::Wrong,
        );
        return 1;
    }
    ctx.logger.log_show_with(
        &format!("[ {} ] marker written [ {} ]", ctx.case, path.display()),
        Tag::Success,
        Status::Ok,
    );
    0
}
