use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{Error, Result};

/// Default Zenoh router port.
pub const DEFAULT_BUS_PORT: u16 = 7447;

/// Pub/sub bus connection settings.
///
/// The bridge only talks to the bus when both `host` and `base_topic` are
/// set; otherwise publishing and subscribing are silent no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Router host name or address.
    #[serde(default)]
    pub host: String,

    /// Router TCP port.
    #[serde(default = "default_bus_port")]
    pub port: u16,

    /// User name for authentication (empty disables auth).
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Topic every reading and the control channel are namespaced under.
    #[serde(default)]
    pub base_topic: String,
}

fn default_mode() -> String {
    "client".to_string()
}

fn default_bus_port() -> u16 {
    DEFAULT_BUS_PORT
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            host: String::new(),
            port: DEFAULT_BUS_PORT,
            user: String::new(),
            password: String::new(),
            base_topic: String::new(),
        }
    }
}

impl BusConfig {
    /// True when both the host and the base topic are set.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && !self.base_topic.trim().is_empty()
    }

    /// Zenoh endpoint for the configured router.
    pub fn endpoint(&self) -> String {
        format!("tcp/{}:{}", self.host.trim(), self.port)
    }

    /// True when credentials should be sent on connect.
    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Read a JSON5 configuration file into `T`.
///
/// A missing file is [`Error::ConfigNotFound`], so callers can choose to
/// run on defaults instead.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(Error::Io(e)),
    };

    parse_config(&content)
}

/// Parse JSON5 configuration text into `T`.
pub fn parse_config<T: DeserializeOwned>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        #[serde(default)]
        bus: BusConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_parse_bus_config() {
        let json5 = r#"
        {
            bus: {
                host: "broker.local",
                port: 7448,
                user: "bridge",
                password: "secret",
                base_topic: "home/heating",
            },
            logging: {
                level: "debug",
                format: "json",
            },
        }
        "#;

        let config: Wrapper = parse_config(json5).unwrap();

        assert_eq!(config.bus.mode, "client");
        assert_eq!(config.bus.host, "broker.local");
        assert_eq!(config.bus.port, 7448);
        assert_eq!(config.bus.endpoint(), "tcp/broker.local:7448");
        assert!(config.bus.has_credentials());
        assert!(config.bus.is_configured());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_default_config() {
        let config: Wrapper = parse_config("{}").unwrap();

        assert_eq!(config.bus, BusConfig::default());
        assert_eq!(config.bus.port, DEFAULT_BUS_PORT);
        assert!(!config.bus.is_configured());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_is_configured_requires_host_and_topic() {
        let mut bus = BusConfig {
            host: "broker".to_string(),
            ..Default::default()
        };
        assert!(!bus.is_configured());

        bus.base_topic = "   ".to_string();
        assert!(!bus.is_configured());

        bus.base_topic = "vcontrol".to_string();
        assert!(bus.is_configured());

        bus.host = String::new();
        assert!(!bus.is_configured());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result: Result<Wrapper> = parse_config("{ bus: { port: \"seven\" } }");
        assert!(matches!(result, Err(Error::ConfigParse(_))));

        let result: Result<Wrapper> = parse_config("{ bus: ");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }
}
