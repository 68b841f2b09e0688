use ::cid::Cid;
use multihash::Multihash;
use thiserror::Error;

use ankra_core::{AnkraError, ContentHash};

/// Raw-block multicodec.
const RAW_CODEC: u64 = 0x55;

/// sha2-256 multihash code.
const SHA2_256_CODE: u64 = 0x12;

#[derive(Debug, Error)]
pub enum CidCodecError {
    #[error("digest must be {expected} bytes, got {got}")]
    WrongDigestLength { expected: usize, got: usize },

    #[error("multihash wrap failed: {0}")]
    Multihash(String),

    #[error("invalid cid: {0}")]
    InvalidCid(String),

    #[error("cid does not wrap a sha2-256 digest (code {0:#x})")]
    NotSha256(u64),
}

/// Derive a CIDv1 (raw codec, sha2-256) from an existing content hash.
///
/// The digest is wrapped as a multihash as-is. Invariant: the CID's digest
/// bytes equal the content hash — the already-hashed bytes are never fed
/// through SHA-256 again.
pub fn cid_from_hash(hash: &ContentHash) -> Result<Cid, CidCodecError> {
    let digest = hash.digest32().map_err(|e| match e {
        AnkraError::WrongDigestLength { expected, got } => {
            CidCodecError::WrongDigestLength { expected, got }
        }
        other => CidCodecError::InvalidCid(other.to_string()),
    })?;
    let mh = Multihash::<64>::wrap(SHA2_256_CODE, &digest)
        .map_err(|e| CidCodecError::Multihash(e.to_string()))?;
    Ok(Cid::new_v1(RAW_CODEC, mh))
}

/// Recover the content hash wrapped inside a CID string.
pub fn hash_from_cid(cid: &str) -> Result<ContentHash, CidCodecError> {
    let cid: Cid = cid
        .parse()
        .map_err(|e: ::cid::Error| CidCodecError::InvalidCid(e.to_string()))?;
    if cid.hash().code() != SHA2_256_CODE {
        return Err(CidCodecError::NotSha256(cid.hash().code()));
    }
    ContentHash::from_bytes(cid.hash().digest())
        .map_err(|e| CidCodecError::InvalidCid(e.to_string()))
}
