use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};
use crate::reading::Reading;

/// Encoding used for published reading payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON object per reading (default, what most bus consumers expect).
    #[default]
    Json,

    /// CBOR map per reading.
    Cbor,
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Format just the numeric value of a reading.
///
/// Uses the shortest representation that round-trips, so `21.0` becomes
/// `"21"` and `21.5` stays `"21.5"`. Returns `None` when the reading has no
/// numeric value.
pub fn format_value(reading: &Reading) -> Option<String> {
    reading.value.map(|v| v.to_string())
}
