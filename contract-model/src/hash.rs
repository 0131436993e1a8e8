//! Canonical JSON encoding and SHA-256 content hashing.
//!
//! Recursively sorts object keys before hashing so the same logical value
//! always hashes the same way regardless of field insertion order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sort object keys so the same logical value always serializes
/// to the same bytes regardless of field insertion order.
pub fn canonicalize(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize).collect()),
        _ => v.clone(),
    }
}

/// Canonical UTF-8 bytes of a value: sorted keys, compact encoding.
pub fn canonical_bytes(v: &Value) -> Vec<u8> {
    serde_json::to_vec(&canonicalize(v)).expect("canonical json never fails to serialize")
}

/// Lowercase hex SHA-256 over the canonical encoding of `v`.
pub fn content_hash(v: &Value) -> String {
    let bytes = canonical_bytes(v);
    hex_sha256(&bytes)
}

/// Lowercase hex SHA-256 of raw bytes.
pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of the concatenation of two hex-encoded hashes, used by the
/// Merkle tree (left || right hashed as their hex-string bytes).
pub fn hex_pair_hash(left_hex: &str, right_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left_hex.as_bytes());
    hasher.update(right_hex.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_sorts_nested_keys() {
        let v = json!({"b": 1, "a": {"z": 1, "y": 2}});
        let c = canonicalize(&v);
        assert_eq!(serde_json::to_string(&c).unwrap(), r#"{"a":{"y":2,"z":1},"b":1}"#);
    }

    #[test]
    fn content_hash_is_order_independent() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hex_sha256_matches_known_vector() {
        assert_eq!(
            hex_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
