//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use process_test_orchestrator::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{PtoError, Result};
pub use crate::core::exit::ExitStatus;
pub use crate::core::signals::SignalState;

// Coordination
pub use crate::coord::counter::ExitCounter;
pub use crate::coord::flag::ParallelFlag;
pub use crate::coord::lock::{LockFile, LockGuard};

// Ledger
pub use crate::ledger::checksum::run_directory_checksum;
pub use crate::ledger::document::{CaseEntry, RunDocument};
pub use crate::ledger::store::{LedgerStore, Mutation};

// Registry
pub use crate::registry::bodies::{BodyContext, BodyRegistry, CaseBody};
pub use crate::registry::catalog::DefinitionCatalog;
pub use crate::registry::definition::{
    CaseMode, CaseSpec, Definition, ProfileDefinition, TestDefinition, UserMode,
};

// Dispatch
pub use crate::dispatch::dispatcher::{Dispatcher, Plan, RunMode};
pub use crate::guard::WorkerContext;

// Remote
pub use crate::remote::client::RemoteClient;
pub use crate::remote::server::RemoteServer;
