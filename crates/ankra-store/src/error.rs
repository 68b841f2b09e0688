use thiserror::Error;

use ankra_core::{AnkraError, ContentHash};
use ankra_crypto::cid::CidCodecError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No tier could yield the body. Retryable: the body may simply not have
    /// propagated yet.
    #[error("event not found in any tier: {0}")]
    NotFound(ContentHash),

    /// Integrity violation on read or an expected-hash gate on write. Fatal.
    #[error("hash mismatch: content hashes to {actual}, expected {expected}")]
    HashMismatch { expected: ContentHash, actual: ContentHash },

    /// Tiers answered, but only with canonical (signature-less) copies.
    #[error("no tier could yield a signed copy of {0}")]
    SignatureUnavailable(ContentHash),

    #[error("invalid event: {0}")]
    Schema(#[from] AnkraError),

    #[error(transparent)]
    Cid(#[from] CidCodecError),

    #[error("cache backend: {0}")]
    Cache(String),

    #[error("content-addressed backend: {0}")]
    Ipfs(String),

    #[error("object backend: {0}")]
    S3(String),

    #[error("every configured backend failed to store {0}")]
    AllBackendsFailed(ContentHash),

    #[error("no backend configured for this operation")]
    NoBackend,
}
