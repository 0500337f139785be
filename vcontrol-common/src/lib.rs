//! vcontrol common library
//!
//! Shared types and utilities for the vcontrold telemetry bridge:
//!
//! - [`reading`] - `vclient` output model (`Reading`, `ProcessResult`, `QueryResult`)
//! - [`serialization`] - JSON/CBOR payload encoding
//! - [`config`] - bus and logging configuration (JSON5 format)
//! - [`session`] - Zenoh session opening
//! - [`topic`] - topic builders and command-name sanitizing
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod reading;
pub mod serialization;
pub mod session;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{BusConfig, LogFormat, LoggingConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use reading::{ProcessResult, QueryResult, Reading, decode_output, exit_code};
pub use serialization::{Format, decode, encode, format_value};
pub use session::connect;
pub use topic::{COMMANDS_SUBTOPIC, build_topic, sanitize_subtopic, validate_base_topic};

/// Map a configured log level onto a `tracing` filter directive.
///
/// Besides the usual `tracing` names, accepts `information`, `warning`,
/// `err`, `critical` and `fatal` in any case. Unknown values are passed
/// through so that full `EnvFilter` directives keep working.
///
/// # Example
/// ```
/// use vcontrol_common::normalize_log_level;
///
/// assert_eq!(normalize_log_level("Warning"), "warn");
/// assert_eq!(normalize_log_level("fatal"), "error");
/// assert_eq!(normalize_log_level("vcontrol_bridge=debug"), "vcontrol_bridge=debug");
/// ```
pub fn normalize_log_level(level: &str) -> String {
    let trimmed = level.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "trace" => "trace".to_string(),
        "debug" => "debug".to_string(),
        "info" | "information" => "info".to_string(),
        "warn" | "warning" => "warn".to_string(),
        "error" | "err" | "critical" | "fatal" => "error".to_string(),
        "none" | "off" => "off".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two
/// output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = normalize_log_level(&config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_log_level_aliases() {
        assert_eq!(normalize_log_level("Information"), "info");
        assert_eq!(normalize_log_level(" warn "), "warn");
        assert_eq!(normalize_log_level("ERR"), "error");
        assert_eq!(normalize_log_level("Critical"), "error");
        assert_eq!(normalize_log_level("None"), "off");
        assert_eq!(normalize_log_level("trace"), "trace");
    }
}
