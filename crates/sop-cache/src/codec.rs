//! JSON wire format for cached values.
//!
//! Every value is stored as UTF-8 encoded JSON so entries written by other
//! clients of the same store stay readable.

use serde::{de::DeserializeOwned, Serialize};
use sop_core::{SopError, SopResult};

/// Encodes a value as UTF-8 JSON bytes.
///
/// Returns `None` when the value serializes to JSON `null`, which callers
/// treat as "nothing to store".
///
/// # Errors
///
/// Fails if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> SopResult<Option<Vec<u8>>> {
    let json = serde_json::to_value(value)?;
    if json.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_vec(&json)?))
}

/// Decodes UTF-8 JSON bytes into `T`.
///
/// # Errors
///
/// `SopError::Decode` when the bytes are not UTF-8 or not valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SopResult<T> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SopError::Decode(format!("stored value is not UTF-8: {}", e)))?;
    Ok(serde_json::from_str(text)?)
}
