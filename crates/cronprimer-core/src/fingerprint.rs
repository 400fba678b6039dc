//! Content fingerprints for generated objects.
//!
//! A fingerprint is the hex SHA-256 of an object's canonical JSON. It is
//! stored as an annotation on the generated object and compared on the next
//! pass to decide whether a write is needed.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::canonical_json::to_canonical_bytes;
use crate::error::Result;

/// Computes the fingerprint of `value`.
///
/// # Errors
///
/// Returns [`crate::Error::Fingerprint`] if `value` cannot be serialized.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_bytes(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
