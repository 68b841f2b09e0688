use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;
use crate::types::ContentHash;

/// On-chain anchor action payload, as emitted by the contract.
///
/// `hash` is left as raw JSON here; sources produce it in several shapes
/// (hex string, byte array, tagged object) and the processor normalizes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchorAction {
    pub author: String,
    #[serde(rename = "type")]
    pub type_code: u32,
    pub hash: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub ts: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Chain position metadata attached by whichever source observed the anchor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub block_num: u64,
    #[serde(default)]
    pub block_id: String,
    #[serde(default)]
    pub trx_id: String,
    #[serde(default)]
    pub action_ordinal: u32,
    #[serde(default)]
    pub source: String,
    /// Overrides the default `active` permission for the authorization check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

/// The normalized record every chain source produces, regardless of
/// transport.
///
/// `content_hash` always originates from the anchor's `hash` field (never
/// from re-hashing the payload), so the same anchor observed through
/// different sources carries an identical identity. `event_hash` is a
/// payload digest kept for tracing only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchoredEvent {
    pub content_hash: ContentHash,
    pub event_hash: String,
    pub payload: Value,
    pub block_num: u64,
    pub block_id: String,
    pub trx_id: String,
    pub action_ordinal: u32,
    pub timestamp: String,
    pub source: String,
    pub contract_account: String,
    pub action_name: String,
}

impl AnchoredEvent {
    pub fn chain_metadata(&self) -> ChainMetadata {
        ChainMetadata {
            block_num: self.block_num,
            block_id: self.block_id.clone(),
            trx_id: self.trx_id.clone(),
            action_ordinal: self.action_ordinal,
            source: self.source.clone(),
            permission: None,
        }
    }
}

/// Provenance block attached to every verified event before dispatch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockchainMetadata {
    pub anchor_hash: String,
    pub block_num: u64,
    pub block_id: String,
    pub trx_id: String,
    pub action_ordinal: u32,
    pub source: String,
    /// Which store tier (or CID path) actually served the body.
    pub retrieval_source: String,
    pub ingested_at: String,
}

/// A fully verified event handed to downstream handlers.
#[derive(Clone, Debug, Serialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub blockchain_verified: bool,
    pub blockchain_metadata: BlockchainMetadata,
}
