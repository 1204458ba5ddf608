//! Core types: errors, configuration, exit codes, run-directory layout.

pub mod config;
pub mod errors;
pub mod exit;
pub mod paths;
pub mod shell;
pub mod signals;
