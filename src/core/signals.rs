//! Signal handling: SIGINT/SIGTERM interruption flags shared by the
//! dispatcher, workers, and the remote listener.
//!
//! Uses the `signal-hook` crate for safe signal registration. Consumers poll
//! the flags between units of work rather than blocking on signals, so a
//! protected worker can finish its body before reacting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Thread-safe interruption state.
///
/// Flags use `Ordering::Relaxed`; they are polled in loops and carry no
/// ordering relationship with other atomics.
#[derive(Debug, Clone)]
pub struct SignalState {
    sigint: Arc<AtomicBool>,
    sigterm: Arc<AtomicBool>,
}

impl SignalState {
    /// Create the state and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not
    /// fatal, matching a run that simply cannot be interrupted gracefully.
    #[must_use]
    pub fn install() -> Self {
        let state = Self::from_flags(
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
        );
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&state.sigint)) {
            eprintln!("[PTO-SIGNAL] failed to register SIGINT: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&state.sigterm)) {
            eprintln!("[PTO-SIGNAL] failed to register SIGTERM: {e}");
        }
        state
    }

    /// Build from raw flags without touching OS handlers.
    #[must_use]
    pub fn from_flags(sigint: Arc<AtomicBool>, sigterm: Arc<AtomicBool>) -> Self {
        Self { sigint, sigterm }
    }

    /// Whether any interruption signal has arrived.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.sigint.load(Ordering::Relaxed) || self.sigterm.load(Ordering::Relaxed)
    }

    /// Number of the signal that arrived, SIGINT taking precedence when both
    /// flags are set. `None` while uninterrupted.
    #[must_use]
    pub fn last_signal(&self) -> Option<i32> {
        if self.sigint.load(Ordering::Relaxed) {
            Some(SIGINT)
        } else if self.sigterm.load(Ordering::Relaxed) {
            Some(SIGTERM)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_state() -> (SignalState, Arc<AtomicBool>, Arc<AtomicBool>) {
        let sigint = Arc::new(AtomicBool::new(false));
        let sigterm = Arc::new(AtomicBool::new(false));
        let state = SignalState::from_flags(Arc::clone(&sigint), Arc::clone(&sigterm));
        (state, sigint, sigterm)
    }

    #[test]
    fn fresh_state_is_uninterrupted() {
        let (state, _, _) = raw_state();
        assert!(!state.interrupted());
        assert_eq!(state.last_signal(), None);
    }

    #[test]
    fn sigint_flag_reports_signal_two() {
        let (state, sigint, _) = raw_state();
        sigint.store(true, Ordering::Relaxed);
        assert!(state.interrupted());
        assert_eq!(state.last_signal(), Some(SIGINT));
    }

    #[test]
    fn sigterm_flag_reports_signal_fifteen() {
        let (state, _, sigterm) = raw_state();
        sigterm.store(true, Ordering::Relaxed);
        assert_eq!(state.last_signal(), Some(SIGTERM));
    }

    #[test]
    fn sigint_wins_when_both_set() {
        let (state, sigint, sigterm) = raw_state();
        sigint.store(true, Ordering::Relaxed);
        sigterm.store(true, Ordering::Relaxed);
        assert_eq!(state.last_signal(), Some(SIGINT));
    }

    #[test]
    fn clones_share_flags() {
        let (state, sigint, _) = raw_state();
        let other = state.clone();
        sigint.store(true, Ordering::Relaxed);
        assert!(other.interrupted());
    }
}
