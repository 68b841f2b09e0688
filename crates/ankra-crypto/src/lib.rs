pub mod canonical;
pub mod cid;
pub mod hash;
pub mod signature;

pub use canonical::{calculate_event_hash, canonical_json, event_digest, sorted_json};
pub use hash::{parse_hash, sha256};
pub use self::cid::{cid_from_hash, hash_from_cid, CidCodecError};
pub use signature::{
    sign_event, verify_event_signature, EventSigner, SignatureFailure, SignatureOptions,
    SignatureOutcome,
};
