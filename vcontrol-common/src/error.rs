use thiserror::Error;

/// Error type shared by the vcontrol crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read, parsed or applied.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// The file was read but is not valid JSON5 for the target type.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Failure reported by the Zenoh session.
    #[error("Bus error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR error: {0}")]
    Cbor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A base topic or subtopic that the bus would reject.
    #[error("Invalid topic '{topic}': {reason}")]
    Topic { topic: String, reason: String },
}

impl Error {
    /// Create a topic validation error.
    pub fn topic(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Topic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

/// Result type alias using the common [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
