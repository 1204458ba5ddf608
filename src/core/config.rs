//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{PtoError, Result};

/// Full orchestrator configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub paths: PathsConfig,
    pub locks: LockConfig,
    pub log: LogConfig,
    pub remote: RemoteConfig,
}

/// Where runs, definitions, and backups live on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Config file this instance was loaded from.
    pub config_file: PathBuf,
    /// Root for per-run directories (run logs + ledger documents).
    pub logs_dir: PathBuf,
    /// Directory of declarative test/profile definition files.
    pub definitions_dir: PathBuf,
    /// Destination for run archives.
    pub backups_dir: PathBuf,
}

/// Scoped file-lock behavior for the run-directory coordination primitives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    /// Maximum time to wait for a lock token before giving up.
    pub acquire_timeout_secs: u64,
    /// Pause between lock-token existence polls.
    pub poll_interval_ms: u64,
}

/// Logging knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Emit DEBUG-tagged lines (suppressed by default).
    pub debug: bool,
}

/// Point-to-point remote command channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    /// Listener address on the paired link.
    pub server_ip: String,
    /// Listener port.
    pub server_port: u16,
    /// Client address on the paired link.
    pub client_ip: String,
    /// Regex matching the name of the point-to-point interface.
    pub interface_pattern: String,
    /// Deadline for `ShellCommand` execution on the listener.
    pub shell_timeout_secs: u64,
    /// Per-recv deadline on the client side.
    pub recv_timeout_secs: u64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[PTO-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("pto").join("config.toml");
        let data = home_dir.join(".local").join("share").join("pto");
        Self {
            config_file: cfg,
            logs_dir: data.join("logs"),
            definitions_dir: data.join("definitions"),
            backups_dir: data.join("backups"),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: 30,
            poll_interval_ms: 100,
        }
    }
}

impl LockConfig {
    /// Acquire timeout as a [`Duration`].
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            server_ip: "192.168.0.100".to_string(),
            server_port: 1500,
            client_ip: "192.168.0.200".to_string(),
            interface_pattern: default_interface_pattern().to_string(),
            shell_timeout_secs: 60,
            recv_timeout_secs: 90,
        }
    }
}

/// Default point-to-point interface name pattern per platform.
const fn default_interface_pattern() -> &'static str {
    if cfg!(target_os = "macos") {
        "en[4-9]"
    } else {
        "enp[0-9]{2}|enx[0-9a-f]*"
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| PtoError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(PtoError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(raw) = env::var_os("PTO_LOGS_DIR") {
            self.paths.logs_dir = PathBuf::from(raw);
        }
        if let Some(raw) = env::var_os("PTO_DEFINITIONS_DIR") {
            self.paths.definitions_dir = PathBuf::from(raw);
        }
        if let Some(raw) = env::var_os("PTO_BACKUPS_DIR") {
            self.paths.backups_dir = PathBuf::from(raw);
        }
        set_env_u64(
            "PTO_LOCK_ACQUIRE_TIMEOUT_SECS",
            &mut self.locks.acquire_timeout_secs,
        )?;
        set_env_u64("PTO_LOCK_POLL_INTERVAL_MS", &mut self.locks.poll_interval_ms)?;
        set_env_bool("PTO_LOG_DEBUG", &mut self.log.debug)?;
        if let Ok(raw) = env::var("PTO_REMOTE_SERVER_IP") {
            self.remote.server_ip = raw;
        }
        if let Ok(raw) = env::var("PTO_REMOTE_CLIENT_IP") {
            self.remote.client_ip = raw;
        }
        if let Ok(raw) = env::var("PTO_REMOTE_SERVER_PORT") {
            self.remote.server_port =
                raw.parse::<u16>().map_err(|e| PtoError::InvalidConfig {
                    details: format!("PTO_REMOTE_SERVER_PORT: {e}"),
                })?;
        }
        if let Ok(raw) = env::var("PTO_REMOTE_INTERFACE_PATTERN") {
            self.remote.interface_pattern = raw;
        }
        set_env_u64(
            "PTO_REMOTE_SHELL_TIMEOUT_SECS",
            &mut self.remote.shell_timeout_secs,
        )?;
        set_env_u64(
            "PTO_REMOTE_RECV_TIMEOUT_SECS",
            &mut self.remote.recv_timeout_secs,
        )?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.locks.acquire_timeout_secs == 0 {
            return Err(PtoError::InvalidConfig {
                details: "locks.acquire_timeout_secs must be >= 1".to_string(),
            });
        }
        if self.locks.poll_interval_ms == 0 {
            return Err(PtoError::InvalidConfig {
                details: "locks.poll_interval_ms must be >= 1".to_string(),
            });
        }
        if self.remote.server_port == 0 {
            return Err(PtoError::InvalidConfig {
                details: "remote.server_port must be nonzero".to_string(),
            });
        }
        for (name, ip) in [
            ("remote.server_ip", &self.remote.server_ip),
            ("remote.client_ip", &self.remote.client_ip),
        ] {
            if ip.parse::<Ipv4Addr>().is_err() {
                return Err(PtoError::InvalidConfig {
                    details: format!("{name} is not a valid IPv4 address: {ip}"),
                });
            }
        }
        if let Err(e) = regex::Regex::new(&self.remote.interface_pattern) {
            return Err(PtoError::InvalidConfig {
                details: format!("remote.interface_pattern is not a valid regex: {e}"),
            });
        }
        Ok(())
    }
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Ok(raw) = env::var(name) {
        *slot = raw.parse::<u64>().map_err(|e| PtoError::InvalidConfig {
            details: format!("{name}: {e}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Ok(raw) = env::var(name) {
        *slot = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                return Err(PtoError::InvalidConfig {
                    details: format!("{name}: expected a boolean, got {other}"),
                });
            }
        };
    }
    Ok(())
}
