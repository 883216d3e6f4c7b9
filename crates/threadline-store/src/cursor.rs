//! Opaque pagination cursors: base64-encoded JSON of the last key read.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use threadline_core::error::DomainError;

/// The last key of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorKey {
    /// Partition key of the last item.
    pub pk: String,
    /// Sort key of the last item, for range queries within one partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sk: Option<String>,
}

/// Encodes a cursor.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the key cannot be serialized.
pub fn encode(key: &CursorKey) -> Result<String, DomainError> {
    let json = serde_json::to_vec(key)?;
    Ok(BASE64_STANDARD.encode(json))
}

/// Decodes a cursor produced by [`encode`].
///
/// # Errors
///
/// Returns `DomainError::Validation` if the cursor is not one of ours.
pub fn decode(cursor: &str) -> Result<CursorKey, DomainError> {
    let bytes = BASE64_STANDARD
        .decode(cursor)
        .map_err(|e| DomainError::Validation(format!("invalid cursor: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| DomainError::Validation(format!("invalid cursor: {e}")))
}
