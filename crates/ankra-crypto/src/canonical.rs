use serde_json::Value;

use ankra_core::{AnkraError, ContentHash, Event};

use crate::hash::sha256;

/// Deterministic encoding of an event payload: JSON with keys sorted
/// lexicographically at every depth and the top-level `sig` field removed.
///
/// The content hash everywhere in the pipeline is SHA-256 over the UTF-8
/// bytes of this form, so two bodies that differ only in key order or in the
/// presence of `sig` hash identically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().filter(|k| *k != "sig").collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_scalar(&Value::String((*key).clone()), &mut out);
                out.push(':');
                write_sorted(&map[*key], &mut out);
            }
            out.push('}');
        }
        other => write_sorted(other, &mut out),
    }
    out
}

/// Like [`canonical_json`] but keeps `sig`: the deterministic encoding of a
/// complete signed event, used where full blocks are published or compared.
pub fn sorted_json(value: &Value) -> String {
    let mut out = String::new();
    write_sorted(value, &mut out);
    out
}

fn write_sorted(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_scalar(&Value::String((*key).clone()), out);
                out.push(':');
                write_sorted(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_sorted(item, out);
            }
            out.push(']');
        }
        scalar => push_scalar(scalar, out),
    }
}

fn push_scalar(value: &Value, out: &mut String) {
    // Strings, numbers, bools and null; serde_json cannot fail on these.
    out.push_str(&serde_json::to_string(value).expect("scalar serialization is infallible"));
}

/// SHA-256 digest of the canonical form of `event` (signature excluded).
pub fn event_digest(event: &Event) -> Result<[u8; 32], AnkraError> {
    let value = event.to_value()?;
    Ok(sha256(canonical_json(&value).as_bytes()))
}

/// The canonical content hash of an event.
pub fn calculate_event_hash(event: &Event) -> Result<ContentHash, AnkraError> {
    Ok(ContentHash::from_digest(event_digest(event)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_sorted_at_every_depth() {
        let v = json!({ "b": { "z": 1, "a": [ { "y": 2, "x": 3 } ] }, "a": true });
        assert_eq!(
            canonical_json(&v),
            r#"{"a":true,"b":{"a":[{"x":3,"y":2}],"z":1}}"#
        );
    }

    #[test]
    fn top_level_sig_excluded_nested_sig_kept() {
        let v = json!({ "sig": "aa", "body": { "sig": "keep" }, "v": 1 });
        assert_eq!(canonical_json(&v), r#"{"body":{"sig":"keep"},"v":1}"#);
    }

    fn event(value: serde_json::Value) -> Event {
        Event::from_value(value).unwrap()
    }

    #[test]
    fn hash_invariant_under_key_order_and_sig() {
        let a = event(json!({
            "v": 1,
            "type": 21,
            "author_pubkey": "02aa",
            "created_at": 5u64,
            "parents": [],
            "body": { "x": 1, "y": { "b": 2, "a": 3 } },
            "sig": "11111111",
        }));
        let b = event(json!({
            "body": { "y": { "a": 3, "b": 2 }, "x": 1 },
            "created_at": 5u64,
            "author_pubkey": "02aa",
            "parents": [],
            "type": 21,
            "v": 1,
            "sig": "22222222",
        }));
        assert_eq!(
            calculate_event_hash(&a).unwrap(),
            calculate_event_hash(&b).unwrap()
        );
    }

    #[test]
    fn nested_change_changes_hash() {
        let a = event(json!({
            "v": 1, "type": 21, "author_pubkey": "02aa", "created_at": 5u64,
            "body": { "inner": { "value": 1 } },
        }));
        let mut b = a.clone();
        b.body = json!({ "inner": { "value": 2 } });
        assert_ne!(
            calculate_event_hash(&a).unwrap(),
            calculate_event_hash(&b).unwrap()
        );
    }
}
