use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AnkraError;
use crate::types::EventType;

/// Off-chain event `type` field. On-chain anchors carry a numeric code;
/// stored bodies may carry either the code or the symbolic name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeField {
    Code(u32),
    Name(String),
}

impl TypeField {
    /// Whether this field agrees with `expected` (by code or by name).
    pub fn matches(&self, expected: EventType) -> bool {
        match self {
            TypeField::Code(c) => *c == expected.code(),
            TypeField::Name(n) => n == expected.name(),
        }
    }
}

impl std::fmt::Display for TypeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeField::Code(c) => write!(f, "{c}"),
            TypeField::Name(n) => write!(f, "{n}"),
        }
    }
}

/// An off-chain event body.
///
/// `body` and `proofs` are opaque to the pipeline. Unknown top-level fields
/// are captured in `extra` so re-serialization (and therefore hashing) is
/// lossless for bodies written by newer producers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Schema version; must be positive.
    pub v: u32,
    #[serde(rename = "type")]
    pub event_type: TypeField,
    pub author_pubkey: String,
    /// Seconds since epoch; must be positive.
    pub created_at: u64,
    #[serde(default)]
    pub parents: Vec<String>,
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proofs: Option<Value>,
    /// Detached signature over the canonical payload excluding this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Event {
    /// Structural schema check applied before any store write and after any
    /// store read.
    pub fn validate(&self) -> Result<(), AnkraError> {
        if self.v == 0 {
            return Err(AnkraError::InvalidEvent("v must be a positive integer".into()));
        }
        if self.author_pubkey.is_empty() {
            return Err(AnkraError::InvalidEvent("author_pubkey must be non-empty".into()));
        }
        if self.created_at == 0 {
            return Err(AnkraError::InvalidEvent("created_at must be positive".into()));
        }
        if !self.body.is_object() {
            return Err(AnkraError::InvalidEvent("body must be an object".into()));
        }
        Ok(())
    }

    /// An empty-string signature counts as missing.
    pub fn has_signature(&self) -> bool {
        self.sig.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn from_value(value: Value) -> Result<Self, AnkraError> {
        serde_json::from_value(value).map_err(|e| AnkraError::InvalidEvent(e.to_string()))
    }

    pub fn to_value(&self) -> Result<Value, AnkraError> {
        serde_json::to_value(self).map_err(|e| AnkraError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Event {
        Event::from_value(json!({
            "v": 1,
            "type": "CREATE_RELEASE_BUNDLE",
            "author_pubkey": "02aabb",
            "created_at": 1_700_000_000u64,
            "parents": [],
            "body": { "title": "First Light" },
            "sig": "dead",
        }))
        .unwrap()
    }

    #[test]
    fn validates_required_fields() {
        assert!(sample().validate().is_ok());

        let mut e = sample();
        e.author_pubkey.clear();
        assert!(e.validate().is_err());

        let mut e = sample();
        e.created_at = 0;
        assert!(e.validate().is_err());

        let mut e = sample();
        e.v = 0;
        assert!(e.validate().is_err());
    }

    #[test]
    fn empty_sig_is_missing() {
        let mut e = sample();
        assert!(e.has_signature());
        e.sig = Some(String::new());
        assert!(!e.has_signature());
        e.sig = None;
        assert!(!e.has_signature());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = json!({
            "v": 1,
            "type": 21,
            "author_pubkey": "02aabb",
            "created_at": 1_700_000_000u64,
            "parents": ["aa"],
            "body": {},
            "future_field": { "nested": true },
        });
        let e = Event::from_value(raw.clone()).unwrap();
        assert!(e.extra.contains_key("future_field"));
        let back = e.to_value().unwrap();
        assert_eq!(back["future_field"], raw["future_field"]);
    }

    #[test]
    fn type_field_matches_code_and_name() {
        assert!(TypeField::Code(22).matches(EventType::MintEntity));
        assert!(TypeField::Name("MINT_ENTITY".into()).matches(EventType::MintEntity));
        assert!(!TypeField::Name("ADD_CLAIM".into()).matches(EventType::MintEntity));
    }
}
