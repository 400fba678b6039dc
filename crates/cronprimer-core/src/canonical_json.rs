//! Canonical JSON form of generated objects.
//!
//! Objects are converted to a `serde_json::Value`, every map is rebuilt with
//! its keys in byte order, and the result is written without whitespace. The
//! bytes depend only on the JSON content, never on struct field order, map
//! iteration order or whether `serde_json` preserves insertion order.
//!
//! Empty optional fields are serialized by `k8s-openapi` as absent keys, so
//! an object and its round trip through the API server canonicalize alike as
//! long as no defaults were filled in.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur during canonical JSON serialization.
#[derive(Debug, Error)]
pub enum CanonicalJsonError {
    /// The object could not be converted to JSON.
    #[error("object is not representable as JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Rebuilds `value` with every object's keys in byte order.
#[must_use]
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        scalar => scalar,
    }
}

/// Serializes `value` into canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CanonicalJsonError::Serde`] if `value` cannot be represented as
/// JSON, for example a map with non-string keys.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&canonical)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(value: &Value) -> String {
        String::from_utf8(to_canonical_bytes(value).unwrap()).unwrap()
    }

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let v = json!({
            "spec": { "schedule": "50 23 * * *", "jobTemplate": { "spec": {} } },
            "metadata": { "name": "autogen-nightly" }
        });
        assert_eq!(
            text(&v),
            r#"{"metadata":{"name":"autogen-nightly"},"spec":{"jobTemplate":{"spec":{}},"schedule":"50 23 * * *"}}"#
        );
    }

    #[test]
    fn arrays_keep_their_order() {
        let v = json!({ "initContainers": [{ "name": "warmup" }, { "name": "user-init" }] });
        assert_eq!(
            text(&v),
            r#"{"initContainers":[{"name":"warmup"},{"name":"user-init"}]}"#
        );
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(text(&json!({ "s": "a\"b\nc" })), r#"{"s":"a\"b\nc"}"#);
    }

    #[test]
    fn non_string_map_keys_are_rejected() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "x");
        assert!(to_canonical_bytes(&map).is_err());
    }
}
