//! Definition model and lookup: TOML test/profile documents on disk plus the
//! compiled-in registry of case bodies workers can execute.

pub mod bodies;
pub mod catalog;
pub mod definition;
