//! Payload limits applied to metadata before it is stored.
//!
//! Sizes are measured on the compact `serde_json` encoding, the same bytes
//! the SQLite driver writes.

use opsline_core::Metadata;
use serde::Serialize;
use serde_json::Value;

/// Replace `metadata` with a truncation marker when its encoding exceeds
/// `max_bytes`. A limit of `0` disables the check.
///
/// The marker is `{"truncated": true, "max_bytes": .., "bytes": ..}`.
pub fn truncate(metadata: Metadata, max_bytes: usize) -> Metadata {
    if max_bytes == 0 {
        return metadata;
    }
    match serde_json::to_vec(&metadata) {
        Ok(encoded) if encoded.len() <= max_bytes => metadata,
        Ok(encoded) => {
            let mut marker = truncated_marker(max_bytes);
            marker.insert("bytes".into(), encoded.len().into());
            marker
        }
        Err(_) => unserializable(),
    }
}

/// Convert any serializable value into metadata.
///
/// Objects are used as-is, `null` becomes an empty object and every other
/// value is wrapped as `{"value": ..}`.
pub fn to_metadata<T: Serialize + ?Sized>(value: &T) -> Metadata {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) => Metadata::new(),
        Ok(other) => {
            let mut map = Metadata::new();
            map.insert("value".into(), other);
            map
        }
        Err(_) => unserializable(),
    }
}

/// Task arguments as stored on task events.
///
/// Too large argument lists become `{"truncated": true, "max_bytes": ..}`;
/// unlike [`truncate`] the byte count is not reported.
pub fn limit_arguments(arguments: &[Value], max_bytes: usize) -> Value {
    if max_bytes == 0 {
        return Value::Array(arguments.to_vec());
    }
    match serde_json::to_vec(arguments) {
        Ok(encoded) if encoded.len() <= max_bytes => Value::Array(arguments.to_vec()),
        Ok(_) => Value::Object(truncated_marker(max_bytes)),
        Err(_) => Value::Object(unserializable()),
    }
}

fn truncated_marker(max_bytes: usize) -> Metadata {
    let mut marker = Metadata::new();
    marker.insert("truncated".into(), true.into());
    marker.insert("max_bytes".into(), max_bytes.into());
    marker
}

fn unserializable() -> Metadata {
    let mut marker = Metadata::new();
    marker.insert("unserializable".into(), true.into());
    marker
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::ser::Error as _;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test metadata must be an object"),
        }
    }

    #[test]
    fn small_metadata_is_untouched() {
        let input = meta(json!({"key": "users/42", "hit": true}));
        assert_eq!(truncate(input.clone(), 1_000), input);
    }

    #[test]
    fn exact_limit_is_kept() {
        let input = meta(json!({"a": 1}));
        let size = serde_json::to_vec(&input).unwrap().len();
        assert_eq!(truncate(input.clone(), size), input);
    }

    #[test]
    fn oversized_metadata_becomes_marker_with_size() {
        let input = meta(json!({"blob": "x".repeat(500)}));
        let size = serde_json::to_vec(&input).unwrap().len();
        assert_eq!(
            Value::Object(truncate(input, 100)),
            json!({"truncated": true, "max_bytes": 100, "bytes": size})
        );
    }

    #[test]
    fn zero_limit_disables_truncation() {
        let input = meta(json!({"blob": "x".repeat(50_000)}));
        assert_eq!(truncate(input.clone(), 0), input);
    }

    #[test]
    fn size_counts_utf8_bytes() {
        // Four two-byte characters plus `{"k":""}`.
        let input = meta(json!({"k": "éééé"}));
        assert_eq!(truncate(input.clone(), 16), input);
        assert!(truncate(input, 15).contains_key("truncated"));
    }

    #[test]
    fn non_objects_are_wrapped() {
        assert_eq!(Value::Object(to_metadata(&42)), json!({"value": 42}));
        assert_eq!(
            Value::Object(to_metadata(&["a", "b"])),
            json!({"value": ["a", "b"]})
        );
        assert!(to_metadata(&()).is_empty());
    }

    #[test]
    fn failing_serialization_is_flagged() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("broken"))
            }
        }
        assert_eq!(
            Value::Object(to_metadata(&Broken)),
            json!({"unserializable": true})
        );
    }

    #[test]
    fn arguments_are_limited_without_byte_count() {
        let args = vec![json!("report"), json!({"rows": 10})];
        assert_eq!(limit_arguments(&args, 1_000), json!(["report", {"rows": 10}]));
        assert_eq!(
            limit_arguments(&args, 5),
            json!({"truncated": true, "max_bytes": 5})
        );
        assert_eq!(limit_arguments(&args, 0), json!(["report", {"rows": 10}]));
    }
}
