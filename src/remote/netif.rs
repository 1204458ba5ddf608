//! Point-to-point link preparation.
//!
//! The channel runs over a dedicated wired link between host and device.
//! Before binding or connecting, each side finds the link interface by name
//! pattern, verifies the cable reports a carrier, and pins its own address,
//! settling between steps long enough for the hardware to follow.

use std::thread;
use std::time::Duration;

use regex::Regex;

use crate::core::config::RemoteConfig;
use crate::core::errors::{PtoError, Result};
use crate::core::shell::run_shell;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const DOWN_SETTLE: Duration = Duration::from_secs(5);
const ADDRESS_SETTLE: Duration = Duration::from_secs(5);
const UP_SETTLE: Duration = Duration::from_secs(10);

/// Ensure the link interface is up and pinned to `ip`; returns its name.
pub fn ensure_interface(remote: &RemoteConfig, ip: &str) -> Result<String> {
    let iface = detect_interface(remote)?;
    if !is_running(&iface)? {
        return Err(PtoError::InterfaceUnavailable {
            details:
                "No interface Eth p2p running, please connect an eth cable between host and device"
                    .to_string(),
        });
    }

    match current_ip(&iface)? {
        Some(current) if current == ip => {
            println!("IP already set -> [{ip}]");
            return Ok(iface);
        }
        Some(_) => println!("Changing ip..."),
        None => println!("Setting ip..."),
    }

    let sudo = sudo_prefix();
    run_checked(&format!("{sudo}ifconfig {iface} down"))?;
    thread::sleep(DOWN_SETTLE);
    run_checked(&format!("{sudo}ifconfig {iface} {ip} netmask 255.255.255.0"))?;
    thread::sleep(ADDRESS_SETTLE);
    run_checked(&format!("{sudo}ifconfig {iface} up"))?;
    thread::sleep(UP_SETTLE);
    println!("IP set -> {ip}");
    Ok(iface)
}

/// Find the link interface by the configured name pattern.
pub fn detect_interface(remote: &RemoteConfig) -> Result<String> {
    let pattern = Regex::new(&remote.interface_pattern).map_err(|err| PtoError::InvalidConfig {
        details: format!(
            "invalid interface pattern {:?}: {err}",
            remote.interface_pattern
        ),
    })?;
    let listing = run_shell("ifconfig -a", Some(PROBE_TIMEOUT))?;
    first_matching_interface(&listing.output, &pattern).ok_or_else(|| {
        PtoError::InterfaceUnavailable {
            details:
                "No interface Eth p2p detected, please connect an eth cable between host and device"
                    .to_string(),
        }
    })
}

fn is_running(iface: &str) -> Result<bool> {
    let out = run_shell(&format!("ifconfig {iface}"), Some(PROBE_TIMEOUT))?;
    Ok(out.output.contains("RUNNING"))
}

fn current_ip(iface: &str) -> Result<Option<String>> {
    let out = run_shell(&format!("ifconfig {iface}"), Some(PROBE_TIMEOUT))?;
    Ok(first_inet_address(&out.output))
}

/// First interface name in an `ifconfig -a` listing matching `pattern`.
///
/// Interface stanzas start at column zero; continuation lines are indented.
fn first_matching_interface(listing: &str, pattern: &Regex) -> Option<String> {
    for line in listing.lines() {
        if line.is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(name) = line.split([':', ' ']).next() else {
            continue;
        };
        if !name.is_empty() && pattern.is_match(name) {
            return Some(name.to_string());
        }
    }
    None
}

/// First IPv4 address on an `inet` line, covering both the `inet a.b.c.d`
/// and the older `inet addr:a.b.c.d` layouts.
fn first_inet_address(listing: &str) -> Option<String> {
    let Ok(ipv4) = Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$") else {
        return None;
    };
    for line in listing.lines() {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix("inet ") else {
            continue;
        };
        let token = rest
            .trim_start()
            .trim_start_matches("addr:")
            .split_whitespace()
            .next()
            .unwrap_or_default();
        if ipv4.is_match(token) {
            return Some(token.to_string());
        }
    }
    None
}

fn run_checked(command: &str) -> Result<()> {
    let out = run_shell(command, Some(Duration::from_secs(30)))?;
    if out.code != 0 {
        return Err(PtoError::InterfaceUnavailable {
            details: format!("[{command}] failed with code {}", out.code),
        });
    }
    Ok(())
}

fn sudo_prefix() -> &'static str {
    if nix::unistd::geteuid().is_root() {
        ""
    } else {
        "sudo "
    }
}
