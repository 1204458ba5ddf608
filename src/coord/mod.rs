//! On-disk coordination: existence locks, the durable exit counter, and the
//! parallel-mode flag shared between the dispatcher and its workers.

pub mod counter;
pub mod flag;
pub mod lock;
