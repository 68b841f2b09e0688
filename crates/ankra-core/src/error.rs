use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnkraError {
    // ── Hash codec ───────────────────────────────────────────────────────────
    #[error("empty hash")]
    EmptyHash,

    #[error("hash is not valid hex: {0:?}")]
    InvalidHex(String),

    #[error("hash has odd hex length: {0}")]
    OddHexLength(usize),

    #[error("unsupported hash representation: {0}")]
    UnsupportedHashShape(String),

    #[error("digest must be {expected} bytes, got {got}")]
    WrongDigestLength { expected: usize, got: usize },

    // ── Event schema ─────────────────────────────────────────────────────────
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
