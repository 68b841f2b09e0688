use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ankra_core::ContentHash;

use crate::error::StoreError;

/// Small record written beside each object-store body so the hash→CID
/// mapping survives a cache wipe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SidecarMapping {
    pub hash: ContentHash,
    pub cid: String,
    pub stored_at: String,
}

/// Fast key–value tier with TTL semantics.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get_event(&self, hash: &ContentHash) -> Result<Option<String>, StoreError>;
    async fn put_event(&self, hash: &ContentHash, body: &str) -> Result<(), StoreError>;
    async fn get_cid(&self, hash: &ContentHash) -> Result<Option<String>, StoreError>;
    async fn put_cid(&self, hash: &ContentHash, cid: &str) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Content-addressed tier storing raw blocks keyed by CID.
#[async_trait]
pub trait BlockTier: Send + Sync {
    /// Store a raw block and return its CID.
    async fn put_block(&self, bytes: Vec<u8>) -> Result<String, StoreError>;
    /// `Ok(None)` means the block is unknown or unreachable but the tier
    /// itself answered.
    async fn get_block(&self, cid: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Durable object tier storing full bodies plus sidecar mappings.
#[async_trait]
pub trait ObjectTier: Send + Sync {
    async fn put_event(&self, hash: &ContentHash, body: &str) -> Result<(), StoreError>;
    async fn get_event(&self, hash: &ContentHash) -> Result<Option<String>, StoreError>;
    async fn put_mapping(&self, mapping: &SidecarMapping) -> Result<(), StoreError>;
    async fn get_mapping(&self, hash: &ContentHash) -> Result<Option<SidecarMapping>, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}
