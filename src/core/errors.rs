//! PTO-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PtoError>;

/// Top-level error type for the orchestrator.
#[derive(Debug, Error)]
pub enum PtoError {
    #[error("[PTO-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PTO-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PTO-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PTO-1101] ['{name}'] {kind} not found")]
    DefinitionNotFound { kind: &'static str, name: String },

    #[error("[PTO-1102] definition type is not valid: {details}")]
    DefinitionInvalidType { details: String },

    #[error("[PTO-1103] invalid definition '{name}': {details}")]
    InvalidDefinition { name: String, details: String },

    #[error("[PTO-2001] run id folder exists [ {path} ] try another")]
    RunIdCollision { path: PathBuf },

    #[error("[PTO-2002] mode [ {requested} ] invalid, supported [ {configured} ]")]
    ModeMismatch {
        requested: String,
        configured: String,
    },

    #[error(
        "[PTO-2003] test case [ {test} ] -> [ {case} ] in concurrency mode can not run more than ({limit}) times"
    )]
    ConcurrencyLimit {
        test: String,
        case: String,
        limit: u32,
    },

    #[error("[PTO-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[PTO-2102] lock not acquired within {waited_secs}s: {path}")]
    LockTimeout { path: PathBuf, waited_secs: u64 },

    #[error("[PTO-3001] command timeout: {details}")]
    ProcessTimeout { details: String },

    #[error("[PTO-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PTO-3101] no connection to {addr}: connection refused")]
    ConnectionRefused { addr: String },

    #[error("[PTO-3102] interface unavailable: {details}")]
    InterfaceUnavailable { details: String },

    #[error("[PTO-3103] role conflict: {details}")]
    RoleConflict { details: String },

    #[error("[PTO-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PtoError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PTO-1001",
            Self::MissingConfig { .. } => "PTO-1002",
            Self::ConfigParse { .. } => "PTO-1003",
            Self::DefinitionNotFound { .. } => "PTO-1101",
            Self::DefinitionInvalidType { .. } => "PTO-1102",
            Self::InvalidDefinition { .. } => "PTO-1103",
            Self::RunIdCollision { .. } => "PTO-2001",
            Self::ModeMismatch { .. } => "PTO-2002",
            Self::ConcurrencyLimit { .. } => "PTO-2003",
            Self::Serialization { .. } => "PTO-2101",
            Self::LockTimeout { .. } => "PTO-2102",
            Self::ProcessTimeout { .. } => "PTO-3001",
            Self::Io { .. } => "PTO-3002",
            Self::ConnectionRefused { .. } => "PTO-3101",
            Self::InterfaceUnavailable { .. } => "PTO-3102",
            Self::RoleConflict { .. } => "PTO-3103",
            Self::Runtime { .. } => "PTO-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::LockTimeout { .. }
                | Self::ConnectionRefused { .. }
                | Self::InterfaceUnavailable { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for PtoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PtoError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
