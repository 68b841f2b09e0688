use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::StoreError;
use crate::tiers::BlockTier;

#[derive(Clone, Debug)]
pub struct IpfsConfig {
    /// HTTP API endpoint, e.g. `http://127.0.0.1:5001`.
    pub api_url: String,
    /// Optional public gateway, reported in connectivity checks only.
    pub gateway_url: Option<String>,
}

/// Thin client for the content-addressed store's HTTP API.
///
/// Blocks are raw-codec, sha2-256, pinned on write. The API is POST-based
/// throughout; `block/put` takes the bytes as a multipart file field.
pub struct IpfsClient {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Deserialize)]
struct BlockPutResponse {
    #[serde(rename = "Key")]
    key: String,
}

impl IpfsClient {
    pub fn new(config: &IpfsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v0/{path}", self.api_url)
    }

    pub async fn pin_add(&self, cid: &str) -> Result<(), StoreError> {
        let url = self.api(&format!("pin/add?arg={cid}"));
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| StoreError::Ipfs(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Ipfs(format!("pin/add {cid}: {}", resp.status())));
        }
        Ok(())
    }

    /// Node identity; used as the connectivity probe.
    pub async fn id(&self) -> Result<serde_json::Value, StoreError> {
        let resp = self
            .http
            .post(self.api("id"))
            .send()
            .await
            .map_err(|e| StoreError::Ipfs(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Ipfs(format!("id: {}", resp.status())));
        }
        resp.json().await.map_err(|e| StoreError::Ipfs(e.to_string()))
    }
}

#[async_trait]
impl BlockTier for IpfsClient {
    async fn put_block(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        let url = self.api("block/put?cid-codec=raw&mhtype=sha2-256&pin=true");
        let part = reqwest::multipart::Part::bytes(bytes).file_name("block");
        let form = reqwest::multipart::Form::new().part("data", part);
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StoreError::Ipfs(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Ipfs(format!("block/put: {}", resp.status())));
        }
        let parsed: BlockPutResponse =
            resp.json().await.map_err(|e| StoreError::Ipfs(e.to_string()))?;
        debug!(cid = %parsed.key, "block stored");
        Ok(parsed.key)
    }

    async fn get_block(&self, cid: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let url = self.api(&format!("block/get?arg={cid}"));
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| StoreError::Ipfs(e.to_string()))?;
        // The API reports unknown or unpinned blocks as a 500 with a
        // "not found"-class message; treat any non-success as a miss for
        // this tier and let the caller fall through.
        if !resp.status().is_success() {
            debug!(cid, status = %resp.status(), "block/get miss");
            return Ok(None);
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StoreError::Ipfs(e.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.id().await.map(|_| ())
    }
}
