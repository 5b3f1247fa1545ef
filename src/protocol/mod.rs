//! Line-delimited JSON framing shared by the server and the agents.

pub mod codec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Serialize `value` as a single JSON line (without the trailing newline).
///
/// # Errors
///
/// Returns `AppError::Protocol` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Parse one JSON line into `T`.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the line is not valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T> {
    Ok(serde_json::from_str(line.trim())?)
}
