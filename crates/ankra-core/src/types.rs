use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnkraError;

// ── ContentHash ──────────────────────────────────────────────────────────────

/// Canonical content hash: lowercase hex, no `0x` prefix, even length.
///
/// This is the single identifier used for dedup, storage keys and handler
/// dispatch. The 32-byte SHA-256 form is required wherever a CID is derived;
/// shorter digests are accepted by the codec but rejected there.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl TryFrom<String> for ContentHash {
    type Error = AnkraError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl ContentHash {
    /// Normalize a hex string: strips an optional `0x` prefix, lowercases,
    /// and validates that only hex digits remain.
    pub fn from_hex(s: &str) -> Result<Self, AnkraError> {
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if s.is_empty() {
            return Err(AnkraError::EmptyHash);
        }
        if s.len() % 2 != 0 {
            return Err(AnkraError::OddHexLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AnkraError::InvalidHex(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AnkraError> {
        if bytes.is_empty() {
            return Err(AnkraError::EmptyHash);
        }
        Ok(Self(hex::encode(bytes)))
    }

    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        hex::decode(&self.0).expect("validated hex")
    }

    /// The 32-byte digest form, if this hash is SHA-256 sized.
    pub fn digest32(&self) -> Result<[u8; 32], AnkraError> {
        let bytes = self.to_bytes();
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| AnkraError::WrongDigestLength { expected: 32, got: len })
    }

    /// Two-character prefix used for partitioned object-store keys.
    pub fn prefix2(&self) -> &str {
        &self.0[..self.0.len().min(2)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    // Truncated so log lines stay readable with 64-char hashes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}…)", &self.0[..self.0.len().min(12)])
    }
}

// ── EventType ────────────────────────────────────────────────────────────────

/// Numeric event-type codes anchored on chain, with their symbolic names.
///
/// This table is authoritative for on-chain vs off-chain cross-checks and
/// must stay synchronized with the contract's constants.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum EventType {
    CreateReleaseBundle,
    MintEntity,
    ResolveId,
    AddClaim,
    EditClaim,
    Vote,
    Like,
    Finalize,
    MergeEntity,
}

impl EventType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            21 => Some(Self::CreateReleaseBundle),
            22 => Some(Self::MintEntity),
            23 => Some(Self::ResolveId),
            30 => Some(Self::AddClaim),
            31 => Some(Self::EditClaim),
            40 => Some(Self::Vote),
            41 => Some(Self::Like),
            50 => Some(Self::Finalize),
            60 => Some(Self::MergeEntity),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::CreateReleaseBundle => 21,
            Self::MintEntity => 22,
            Self::ResolveId => 23,
            Self::AddClaim => 30,
            Self::EditClaim => 31,
            Self::Vote => 40,
            Self::Like => 41,
            Self::Finalize => 50,
            Self::MergeEntity => 60,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateReleaseBundle => "CREATE_RELEASE_BUNDLE",
            Self::MintEntity => "MINT_ENTITY",
            Self::ResolveId => "RESOLVE_ID",
            Self::AddClaim => "ADD_CLAIM",
            Self::EditClaim => "EDIT_CLAIM",
            Self::Vote => "VOTE",
            Self::Like => "LIKE",
            Self::Finalize => "FINALIZE",
            Self::MergeEntity => "MERGE_ENTITY",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_string_normalizes() {
        let h = ContentHash::from_hex("0xABC123DEF456").unwrap();
        assert_eq!(h.as_str(), "abc123def456");
        let same = ContentHash::from_hex("abc123def456").unwrap();
        assert_eq!(h, same);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(ContentHash::from_hex(""), Err(AnkraError::EmptyHash)));
        assert!(matches!(ContentHash::from_hex("0x"), Err(AnkraError::EmptyHash)));
        assert!(matches!(
            ContentHash::from_hex("abc"),
            Err(AnkraError::OddHexLength(3))
        ));
        assert!(matches!(
            ContentHash::from_hex("zzzz"),
            Err(AnkraError::InvalidHex(_))
        ));
    }

    #[test]
    fn digest32_requires_exact_length() {
        let h = ContentHash::from_digest([7u8; 32]);
        assert_eq!(h.digest32().unwrap(), [7u8; 32]);

        let short = ContentHash::from_hex("abc123def456").unwrap();
        assert!(matches!(
            short.digest32(),
            Err(AnkraError::WrongDigestLength { expected: 32, got: 6 })
        ));
    }

    #[test]
    fn type_table_round_trips() {
        for code in [21, 22, 23, 30, 31, 40, 41, 50, 60] {
            let t = EventType::from_code(code).unwrap();
            assert_eq!(t.code(), code);
        }
        assert!(EventType::from_code(99).is_none());
        assert_eq!(EventType::MintEntity.name(), "MINT_ENTITY");
    }
}
