//! Run orchestration: run-id allocation, worker process bookkeeping, and the
//! dispatcher that expands definitions into batches of worker processes.

pub mod dispatcher;
pub mod proc_table;

#[cfg(test)]
mod test_properties;
