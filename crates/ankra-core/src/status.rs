use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome vocabulary for a processed anchor. The same strings are
/// used internally, in logs, and in webhook responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Verified and dispatched (or dispatch skipped for an unknown type).
    Processed,
    /// Already processed; not an error.
    Duplicate,
    /// No store tier could yield the body; retryable later.
    NotFound,
    /// Signature did not verify; fatal for this anchor.
    InvalidSignature,
    /// Signing key not authorized by the on-chain account; fatal.
    UnauthorizedKey,
    /// Hash mismatch, type mismatch or unexpected failure.
    Error,
}

impl IngestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Duplicate => "duplicate",
            Self::NotFound => "not_found",
            Self::InvalidSignature => "invalid_signature",
            Self::UnauthorizedKey => "unauthorized_key",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_snake_case() {
        let s = serde_json::to_string(&IngestStatus::InvalidSignature).unwrap();
        assert_eq!(s, "\"invalid_signature\"");
        let back: IngestStatus = serde_json::from_str("\"unauthorized_key\"").unwrap();
        assert_eq!(back, IngestStatus::UnauthorizedKey);
    }
}
