//! Error types for the bridge.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the bridge.
///
/// Only configuration errors are fatal. Everything that can go wrong during
/// a poll iteration is recorded in the health state instead.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Could not reach the bus.
    #[error("Bus connection error: {0}")]
    BusConnection(String),

    /// Publishing error.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Broker-level subscribe or unsubscribe error.
    #[error("Subscription on {topic} failed: {message}")]
    Subscribe { topic: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a bus connection error.
    pub fn connection(msg: impl ToString) -> Self {
        Self::BusConnection(msg.to_string())
    }

    /// Create a publish error for a topic.
    pub fn publish(topic: impl Into<String>, msg: impl ToString) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: msg.to_string(),
        }
    }

    /// Create a subscription error for a topic.
    pub fn subscribe(topic: impl Into<String>, msg: impl ToString) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            message: msg.to_string(),
        }
    }
}

/// Marker returned when an operation was interrupted by shutdown.
///
/// Kept apart from [`BridgeError`] because cancellation is a normal way
/// for work to end and is never logged as a failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

impl From<vcontrol_common::Error> for BridgeError {
    fn from(err: vcontrol_common::Error) -> Self {
        match err {
            vcontrol_common::Error::Config(msg) => Self::Config(msg),
            vcontrol_common::Error::ConfigNotFound { path } => Self::ConfigNotFound { path },
            vcontrol_common::Error::ConfigParse(msg) => Self::ConfigParse(msg),
            vcontrol_common::Error::Zenoh(e) => Self::BusConnection(e.to_string()),
            vcontrol_common::Error::Io(e) => Self::Io(e),
            topic @ vcontrol_common::Error::Topic { .. } => {
                Self::ConfigValidation(topic.to_string())
            }
            other => Self::Serialization(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

