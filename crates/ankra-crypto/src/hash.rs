use serde_json::Value;
use sha2::{Digest, Sha256};

use ankra_core::{AnkraError, ContentHash};

/// SHA-256 of arbitrary bytes → 32-byte array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Normalize any accepted hash representation to a canonical [`ContentHash`].
///
/// Accepted shapes:
///   - hex string, any case, optional `0x` prefix
///   - array of byte values
///   - object with a `hex` field (itself a hex string)
///
/// Everything else is rejected with a shape-specific error.
pub fn parse_hash(value: &Value) -> Result<ContentHash, AnkraError> {
    match value {
        Value::String(s) => ContentHash::from_hex(s),
        Value::Array(items) => {
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                let b = item
                    .as_u64()
                    .filter(|&b| b <= u8::MAX as u64)
                    .ok_or_else(|| {
                        AnkraError::UnsupportedHashShape(format!(
                            "array element is not a byte: {item}"
                        ))
                    })?;
                bytes.push(b as u8);
            }
            ContentHash::from_bytes(&bytes)
        }
        Value::Object(map) => match map.get("hex") {
            Some(Value::String(s)) => ContentHash::from_hex(s),
            Some(other) => Err(AnkraError::UnsupportedHashShape(format!(
                "hex field is not a string: {other}"
            ))),
            None => Err(AnkraError::UnsupportedHashShape(
                "object without a hex field".into(),
            )),
        },
        other => Err(AnkraError::UnsupportedHashShape(format!(
            "expected string, byte array or {{hex}} object, got {other}"
        ))),
    }
}
