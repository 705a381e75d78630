// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node configuration.
//!
//! Options are stored as typed fields but exposed through a string-keyed
//! `set`/`get` boundary for wire-level compatibility with the reference
//! implementation. Validation happens at that boundary: a write that would
//! break `checkInterval <= nodeTimeout <= masterTimeout` is rejected and the
//! state is left unchanged.

use crate::error::{Error, Result};
use serde_json::Value;
use std::time::{Duration, UNIX_EPOCH};

/// Default UDP port shared by all instances of a mesh.
pub const DEFAULT_PORT: u16 = 12345;

/// Typed option storage. One instance per node, behind the options mutex.
#[derive(Debug, Clone)]
pub(crate) struct Options {
    /// Hello-loop period in milliseconds.
    pub hello_interval: u64,
    /// Check-loop period in milliseconds.
    pub check_interval: u64,
    /// Non-master peer expiry in milliseconds.
    pub node_timeout: u64,
    /// Master peer expiry in milliseconds.
    pub master_timeout: u64,
    /// Local bind address (dotted quad).
    pub address: String,
    /// Local bind port, also the destination port for every send mode.
    pub port: u16,
    /// Broadcast destination address.
    pub broadcast: String,
    /// Multicast group; overrides broadcast when set.
    pub multicast: Option<String>,
    /// Multicast TTL.
    pub multicast_ttl: u8,
    /// Comma-separated unicast destinations; overrides multicast and broadcast.
    pub unicast: Option<String>,
    /// Reserved. Accepted and stored, performs nothing.
    pub key: Option<String>,
    /// Target master count for the election rule.
    pub masters_required: i64,
    /// Election weight. Higher wins; strict comparison.
    pub weight: f64,
    /// Receive-only mode: never emit hellos.
    pub client: bool,
    /// Set SO_REUSEADDR before bind.
    pub reuse_addr: bool,
    /// Drop datagrams whose pid matches the local process id.
    pub ignore_process: bool,
    /// Drop datagrams whose iid matches the local instance id.
    pub ignore_instance: bool,
    /// Payload attached to each hello.
    pub advertisement: Option<Value>,
    /// Hostname reported in every outbound datagram.
    pub hostname: String,
}

impl Options {
    /// Build the default option set: fixed timer defaults, OS hostname, and
    /// a computed weight just below zero.
    pub fn with_defaults() -> Self {
        Self {
            hello_interval: 1000,
            check_interval: 2000,
            node_timeout: 2000,
            master_timeout: 2000,
            address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            broadcast: "255.255.255.255".to_string(),
            multicast: None,
            multicast_ttl: 1,
            unicast: None,
            key: None,
            masters_required: 1,
            weight: default_weight(),
            client: false,
            reuse_addr: true,
            ignore_process: true,
            ignore_instance: true,
            advertisement: None,
            hostname: system_hostname(),
        }
    }

    /// Apply one option by name. Rejected writes leave the state unchanged.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "helloInterval" => self.hello_interval = as_millis(name, &value)?,
            "checkInterval" => {
                let ms = as_millis(name, &value)?;
                if ms > self.node_timeout {
                    return Err(ordering_violation(name, "exceeds nodeTimeout"));
                }
                self.check_interval = ms;
            }
            "nodeTimeout" => {
                let ms = as_millis(name, &value)?;
                if ms < self.check_interval {
                    return Err(ordering_violation(name, "below checkInterval"));
                }
                if ms > self.master_timeout {
                    return Err(ordering_violation(name, "exceeds masterTimeout"));
                }
                self.node_timeout = ms;
            }
            "masterTimeout" => {
                let ms = as_millis(name, &value)?;
                if ms < self.node_timeout {
                    return Err(ordering_violation(name, "below nodeTimeout"));
                }
                self.master_timeout = ms;
            }
            "address" => self.address = as_string(name, &value)?,
            "port" => self.port = as_port(name, &value)?,
            "broadcast" => self.broadcast = as_string(name, &value)?,
            "multicast" => self.multicast = Some(as_string(name, &value)?),
            "multicastTTL" => self.multicast_ttl = as_ttl(name, &value)?,
            "unicast" => self.unicast = Some(as_string(name, &value)?),
            "key" => self.key = Some(as_string(name, &value)?),
            "mastersRequired" => {
                self.masters_required = value.as_i64().ok_or_else(|| type_error(name, "integer"))?;
            }
            "weight" => self.weight = value.as_f64().ok_or_else(|| type_error(name, "number"))?,
            "client" => self.client = as_bool(name, &value)?,
            "reuseAddr" => self.reuse_addr = as_bool(name, &value)?,
            "ignoreProcess" => self.ignore_process = as_bool(name, &value)?,
            "ignoreInstance" => self.ignore_instance = as_bool(name, &value)?,
            "advertisement" => {
                self.advertisement = if value.is_null() { None } else { Some(value) };
            }
            "hostname" => self.hostname = as_string(name, &value)?,
            other => return Err(Error::UnknownOption(other.to_string())),
        }
        Ok(())
    }

    /// Read one option back by name.
    pub fn get(&self, name: &str) -> Result<Value> {
        let value = match name {
            "helloInterval" => Value::from(self.hello_interval),
            "checkInterval" => Value::from(self.check_interval),
            "nodeTimeout" => Value::from(self.node_timeout),
            "masterTimeout" => Value::from(self.master_timeout),
            "address" => Value::from(self.address.as_str()),
            "port" => Value::from(self.port),
            "broadcast" => Value::from(self.broadcast.as_str()),
            "multicast" => opt_string(&self.multicast),
            "multicastTTL" => Value::from(self.multicast_ttl),
            "unicast" => opt_string(&self.unicast),
            "key" => opt_string(&self.key),
            "mastersRequired" => Value::from(self.masters_required),
            "weight" => Value::from(self.weight),
            "client" => Value::from(self.client),
            "reuseAddr" => Value::from(self.reuse_addr),
            "ignoreProcess" => Value::from(self.ignore_process),
            "ignoreInstance" => Value::from(self.ignore_instance),
            "advertisement" => self.advertisement.clone().unwrap_or(Value::Null),
            "hostname" => Value::from(self.hostname.as_str()),
            other => return Err(Error::UnknownOption(other.to_string())),
        };
        Ok(value)
    }

    /// Non-master expiry as a duration.
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout)
    }

    /// Master expiry as a duration.
    pub fn master_timeout(&self) -> Duration {
        Duration::from_millis(self.master_timeout)
    }
}

fn opt_string(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::from(s.as_str()),
        None => Value::Null,
    }
}

fn type_error(option: &str, expected: &str) -> Error {
    Error::InvalidOption {
        option: option.to_string(),
        reason: format!("expected {expected}"),
    }
}

fn ordering_violation(option: &str, reason: &str) -> Error {
    Error::InvalidOption {
        option: option.to_string(),
        reason: reason.to_string(),
    }
}

fn as_millis(option: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| type_error(option, "non-negative integer milliseconds"))
}

fn as_string(option: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| type_error(option, "string"))
}

fn as_bool(option: &str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| type_error(option, "boolean"))
}

fn as_port(option: &str, value: &Value) -> Result<u16> {
    value
        .as_u64()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| type_error(option, "port number (0-65535)"))
}

fn as_ttl(option: &str, value: &Value) -> Result<u8> {
    value
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| type_error(option, "TTL (0-255)"))
}

/// Compute the default election weight from the wall clock: divide
/// seconds-since-epoch by 10 until the magnitude drops below 1, then negate.
/// Keeps defaults clustered just below zero so any user-supplied positive
/// weight dominates, while still breaking ties between defaults.
fn default_weight() -> f64 {
    let mut weight = UNIX_EPOCH
        .elapsed()
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    while weight > 1.0 {
        weight /= 10.0;
    }
    -weight
}

/// OS hostname (Unix), falling back to environment lookup.
#[cfg(unix)]
fn system_hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY:
    // - buf is a valid mutable buffer with known size (256 bytes)
    // - gethostname writes at most buf.len() bytes including NUL terminator
    // - on success the buffer contains a NUL-terminated hostname string
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret == 0 {
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if let Ok(name) = std::str::from_utf8(&buf[..len]) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    fallback_hostname()
}

#[cfg(not(unix))]
fn system_hostname() -> String {
    fallback_hostname()
}

fn fallback_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
