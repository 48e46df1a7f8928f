//! Bootstrap document canonicalization
//!
//! Bootstrap content is written to disk in canonical form, and the checker
//! compares the canonical form of a request against the file byte for byte.
//! Formatting-only differences in the request therefore never count as drift.

use crate::errors::ValidationError;

/// Parse the document as YAML (a JSON document is valid YAML) and re-emit it.
pub fn try_canonicalize(raw: &[u8]) -> Result<Vec<u8>, ValidationError> {
    let value: serde_yaml::Value = serde_yaml::from_slice(raw)
        .map_err(|e| ValidationError::InvalidBootstrap(e.to_string()))?;
    if value.is_null() {
        return Err(ValidationError::InvalidBootstrap(
            "document is empty".to_string(),
        ));
    }
    let rendered = serde_yaml::to_string(&value)
        .map_err(|e| ValidationError::InvalidBootstrap(e.to_string()))?;
    Ok(rendered.into_bytes())
}

/// Canonical bytes, or the raw bytes if the document does not parse.
pub fn canonicalize(raw: &[u8]) -> Vec<u8> {
    try_canonicalize(raw).unwrap_or_else(|_| raw.to_vec())
}
