//! Execution ledger: one JSON document per run, mutated through a closed set
//! of operations under the ledger lock, sealed with a content checksum over
//! the rest of the run directory.

pub mod checksum;
pub mod document;
pub mod store;
