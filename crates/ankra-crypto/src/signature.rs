use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use thiserror::Error;

use ankra_core::Event;

use crate::canonical::event_digest;

/// Verifier behavior toggles. Production wiring keeps `require_signature`
/// on and `allow_unsigned` off; the latter exists for test fixtures only.
#[derive(Clone, Copy, Debug)]
pub struct SignatureOptions {
    pub require_signature: bool,
    pub allow_unsigned: bool,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self { require_signature: true, allow_unsigned: false }
    }
}

/// Why a signature check did not verify. Encoding problems are kept distinct
/// from a cryptographic mismatch so callers can tell tampering from garbage.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SignatureFailure {
    #[error("signature missing")]
    Missing,

    #[error("author public key missing")]
    MissingKey,

    #[error("invalid public key encoding: {0}")]
    KeyEncoding(String),

    #[error("invalid signature encoding: {0}")]
    SigEncoding(String),

    #[error("Signature verification failed")]
    Mismatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureOutcome {
    Verified,
    /// Unsigned event accepted; only reachable via `allow_unsigned` or a
    /// non-required missing signature.
    Bypassed,
    Failed(SignatureFailure),
}

impl SignatureOutcome {
    pub fn passed(&self) -> bool {
        !matches!(self, SignatureOutcome::Failed(_))
    }
}

/// Verify an event's detached signature against its declared author key.
///
/// The signed message is the SHA-256 digest of the canonical payload with
/// `sig` stripped, so a valid signature replayed onto a modified body fails.
pub fn verify_event_signature(event: &Event, opts: &SignatureOptions) -> SignatureOutcome {
    let has_sig = event.has_signature();
    let has_key = !event.author_pubkey.is_empty();

    match (has_sig, has_key) {
        (false, false) if opts.allow_unsigned => return SignatureOutcome::Bypassed,
        (false, _) if opts.require_signature => {
            return SignatureOutcome::Failed(SignatureFailure::Missing)
        }
        (false, _) => return SignatureOutcome::Bypassed,
        (true, false) => return SignatureOutcome::Failed(SignatureFailure::MissingKey),
        (true, true) => {}
    }

    let digest = match event_digest(event) {
        Ok(d) => d,
        Err(e) => return SignatureOutcome::Failed(SignatureFailure::SigEncoding(e.to_string())),
    };

    let pubkey = match parse_pubkey(&event.author_pubkey) {
        Ok(k) => k,
        Err(e) => return SignatureOutcome::Failed(e),
    };
    let sig = match parse_signature(event.sig.as_deref().unwrap_or_default()) {
        Ok(s) => s,
        Err(e) => return SignatureOutcome::Failed(e),
    };

    let message = Message::from_digest(digest);
    match SECP256K1.verify_ecdsa(&message, &sig, &pubkey) {
        Ok(()) => SignatureOutcome::Verified,
        Err(_) => SignatureOutcome::Failed(SignatureFailure::Mismatch),
    }
}

fn parse_pubkey(hex_key: &str) -> Result<PublicKey, SignatureFailure> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| SignatureFailure::KeyEncoding(e.to_string()))?;
    PublicKey::from_slice(&bytes).map_err(|e| SignatureFailure::KeyEncoding(e.to_string()))
}

fn parse_signature(hex_sig: &str) -> Result<Signature, SignatureFailure> {
    let bytes = hex::decode(hex_sig)
        .map_err(|e| SignatureFailure::SigEncoding(e.to_string()))?;
    Signature::from_compact(&bytes).map_err(|e| SignatureFailure::SigEncoding(e.to_string()))
}

/// Produce the detached signature for an event (ignoring any `sig` already
/// present). Used by publishing tools and test fixtures.
pub fn sign_event(event: &Event, secret: &SecretKey) -> Result<String, SignatureFailure> {
    let digest = event_digest(event)
        .map_err(|e| SignatureFailure::SigEncoding(e.to_string()))?;
    let message = Message::from_digest(digest);
    let sig = SECP256K1.sign_ecdsa(&message, secret);
    Ok(hex::encode(sig.serialize_compact()))
}

/// Holds a signing key and its hex-encoded compressed public key.
pub struct EventSigner {
    secret: SecretKey,
    pub pubkey_hex: String,
}

impl EventSigner {
    pub fn new(secret: SecretKey) -> Self {
        let pubkey = PublicKey::from_secret_key(SECP256K1, &secret);
        Self { secret, pubkey_hex: hex::encode(pubkey.serialize()) }
    }

    /// Returns the event with `author_pubkey` and `sig` filled in.
    pub fn sign(&self, mut event: Event) -> Result<Event, SignatureFailure> {
        event.author_pubkey = self.pubkey_hex.clone();
        event.sig = None;
        let sig = sign_event(&event, &self.secret)?;
        event.sig = Some(sig);
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signer() -> EventSigner {
        EventSigner::new(SecretKey::new(&mut rand::thread_rng()))
    }

    fn unsigned_event() -> Event {
        Event::from_value(json!({
            "v": 1,
            "type": "CREATE_RELEASE_BUNDLE",
            "author_pubkey": "",
            "created_at": 1_700_000_000u64,
            "parents": [],
            "body": { "message": "hello" },
        }))
        .unwrap()
    }

    #[test]
    fn sign_then_verify() {
        let event = signer().sign(unsigned_event()).unwrap();
        let outcome = verify_event_signature(&event, &SignatureOptions::default());
        assert_eq!(outcome, SignatureOutcome::Verified);
    }

    #[test]
    fn tampered_body_fails_with_mismatch() {
        let mut event = signer().sign(unsigned_event()).unwrap();
        event.body = json!({ "message": "tampered" });
        let outcome = verify_event_signature(&event, &SignatureOptions::default());
        assert_eq!(outcome, SignatureOutcome::Failed(SignatureFailure::Mismatch));
    }

    #[test]
    fn signature_replayed_onto_other_event_fails() {
        let s = signer();
        let first = s.sign(unsigned_event()).unwrap();
        let mut second = unsigned_event();
        second.body = json!({ "message": "different" });
        let mut second = s.sign(second).unwrap();
        second.sig = first.sig.clone();
        let outcome = verify_event_signature(&second, &SignatureOptions::default());
        assert_eq!(outcome, SignatureOutcome::Failed(SignatureFailure::Mismatch));
    }

    #[test]
    fn missing_sig_and_key_handling() {
        let mut event = unsigned_event();

        // strict: missing signature
        let outcome = verify_event_signature(&event, &SignatureOptions::default());
        assert_eq!(outcome, SignatureOutcome::Failed(SignatureFailure::Missing));

        // empty-string sig counts as missing
        event.sig = Some(String::new());
        let outcome = verify_event_signature(&event, &SignatureOptions::default());
        assert_eq!(outcome, SignatureOutcome::Failed(SignatureFailure::Missing));

        // dev escape: both missing + allow_unsigned
        let opts = SignatureOptions { require_signature: false, allow_unsigned: true };
        let outcome = verify_event_signature(&event, &opts);
        assert_eq!(outcome, SignatureOutcome::Bypassed);

        // sig present but key missing
        let mut event = unsigned_event();
        event.sig = Some("00".repeat(64));
        let outcome = verify_event_signature(&event, &SignatureOptions::default());
        assert_eq!(outcome, SignatureOutcome::Failed(SignatureFailure::MissingKey));
    }

    #[test]
    fn encoding_errors_are_distinct_from_mismatch() {
        let s = signer();

        // garbage public key
        let mut event = s.sign(unsigned_event()).unwrap();
        event.author_pubkey = "zz-not-hex".into();
        match verify_event_signature(&event, &SignatureOptions::default()) {
            SignatureOutcome::Failed(SignatureFailure::KeyEncoding(_)) => {}
            other => panic!("expected KeyEncoding, got {other:?}"),
        }

        // zero-byte signature
        let mut event = s.sign(unsigned_event()).unwrap();
        event.sig = Some("00".into());
        match verify_event_signature(&event, &SignatureOptions::default()) {
            SignatureOutcome::Failed(SignatureFailure::SigEncoding(_)) => {}
            other => panic!("expected SigEncoding, got {other:?}"),
        }

        // extra bytes appended to an otherwise valid signature
        let mut event = s.sign(unsigned_event()).unwrap();
        let extended = format!("{}ff", event.sig.clone().unwrap());
        event.sig = Some(extended);
        match verify_event_signature(&event, &SignatureOptions::default()) {
            SignatureOutcome::Failed(SignatureFailure::SigEncoding(_)) => {}
            other => panic!("expected SigEncoding, got {other:?}"),
        }
    }
}
