//! Post-run maintenance: integrity validation and archival of run
//! directories.

pub mod backup;
pub mod validate;
