//! Configuration for the vcontrol bridge.
//!
//! Loaded from a JSON5 file, then overridden from environment variables,
//! then validated. Every field has a default so an empty file (or no file
//! at all) plus environment variables is a complete configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vcontrol_common::{BusConfig, Format, LoggingConfig, validate_base_topic};

use crate::error::{BridgeError, Result};

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bus connection settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// vclient invocation and polling settings.
    #[serde(default)]
    pub vclient: VclientConfig,

    /// Health endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How and what to ask vcontrold through `vclient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VclientConfig {
    /// Executable to run (default: "vclient").
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the vclient arguments (for wrappers).
    #[serde(default)]
    pub program_args: Vec<String>,

    /// vcontrold host.
    #[serde(default = "default_vcontrold_host")]
    pub host: String,

    /// vcontrold port.
    #[serde(default = "default_vcontrold_port")]
    pub port: u16,

    /// Commands queried on every poll.
    #[serde(default)]
    pub commands: Vec<String>,

    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Longest wait for another vclient invocation to finish, in seconds.
    #[serde(default = "default_gate_timeout")]
    pub gate_timeout_secs: u64,

    /// Publish only the numeric value instead of the whole reading.
    #[serde(default)]
    pub publish_value_only: bool,

    /// Encoding of whole-reading payloads.
    #[serde(default)]
    pub payload_format: Format,
}

fn default_program() -> String {
    "vclient".to_string()
}

fn default_vcontrold_host() -> String {
    "127.0.0.1".to_string()
}

fn default_vcontrold_port() -> u16 {
    3002
}

fn default_poll_interval() -> u64 {
    60
}

fn default_gate_timeout() -> u64 {
    20
}

impl Default for VclientConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: Vec::new(),
            host: default_vcontrold_host(),
            port: default_vcontrold_port(),
            commands: Vec::new(),
            poll_interval_secs: default_poll_interval(),
            gate_timeout_secs: default_gate_timeout(),
            publish_value_only: false,
            payload_format: Format::default(),
        }
    }
}

impl VclientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_secs)
    }
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Serve `/health/live` and `/health/ready`.
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,

    /// Listen address.
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            listen: default_http_listen(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(vcontrol_common::load_config(path)?)
    }

    /// Parse configuration from a JSON5 string.
    pub fn from_json5(content: &str) -> Result<Self> {
        Ok(vcontrol_common::parse_config(content)?)
    }

    /// Apply environment overrides.
    ///
    /// `lookup` returns the value of a variable, if set. Values that are
    /// blank or fail to parse leave the current setting untouched.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_blank("BUS_HOST") {
            self.bus.host = host.trim().to_string();
        }
        if let Some(port) = non_blank("BUS_PORT").and_then(|v| v.trim().parse().ok()) {
            self.bus.port = port;
        }
        if let Some(user) = non_blank("BUS_USER") {
            self.bus.user = user;
        }
        if let Some(password) = non_blank("BUS_PASSWORD") {
            self.bus.password = password;
        }
        if let Some(topic) = non_blank("BUS_TOPIC") {
            self.bus.base_topic = topic.trim().to_string();
        }

        if let Some(host) = non_blank("VCONTROLD_HOST") {
            self.vclient.host = host.trim().to_string();
        }
        if let Some(port) = non_blank("VCONTROLD_PORT").and_then(|v| v.trim().parse().ok()) {
            self.vclient.port = port;
        }
        if let Some(commands) = non_blank("COMMANDS") {
            let list = split_commands(&commands);
            if !list.is_empty() {
                self.vclient.commands = list;
            }
        }
        if let Some(poll) = non_blank("POLL_SECONDS").and_then(|v| v.trim().parse::<u64>().ok()) {
            if poll > 0 {
                self.vclient.poll_interval_secs = poll;
            }
        }
        if let Some(flag) = non_blank("PUBLISH_VALUE_ONLY").and_then(|v| parse_flag(&v)) {
            self.vclient.publish_value_only = flag;
        }

        if let Some(level) = non_blank("LOG_LEVEL") {
            self.logging.level = level.trim().to_string();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.vclient.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(BridgeError::validation(
                "At least one vclient command is required (vclient.commands or COMMANDS)",
            ));
        }

        if self.vclient.poll_interval_secs == 0 {
            return Err(BridgeError::validation(
                "vclient.poll_interval_secs must be greater than zero",
            ));
        }

        if self.vclient.gate_timeout_secs == 0 {
            return Err(BridgeError::validation(
                "vclient.gate_timeout_secs must be greater than zero",
            ));
        }

        if self.vclient.program.trim().is_empty() {
            return Err(BridgeError::validation("vclient.program must not be empty"));
        }

        if self.bus.is_configured() {
            validate_base_topic(self.bus.base_topic.trim())?;
        }

        Ok(())
    }
}

/// Split a comma-separated command list, trimming and dropping blanks.
pub fn split_commands(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}
