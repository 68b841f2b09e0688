use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use ankra_core::{ContentHash, DEFAULT_EVENT_CACHE_TTL_SECS};

use crate::error::StoreError;
use crate::tiers::CacheTier;

/// Capped exponential backoff for cache operations.
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 100;
const RETRY_CAP_MS: u64 = 2_000;

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6379,
            ttl_secs: DEFAULT_EVENT_CACHE_TTL_SECS,
        }
    }
}

/// Redis-backed cache tier.
///
/// Event bodies live under `event:{hash}`, hash→CID mappings under
/// `ipfs:hash:{hash}`, both with the configured TTL. The connection manager
/// reconnects on its own; individual commands retry with capped exponential
/// backoff on top of that.
pub struct RedisCache {
    manager: ConnectionManager,
    ttl_secs: u64,
}

impl RedisCache {
    pub async fn connect(config: &CacheConfig) -> Result<Self, StoreError> {
        let url = format!("redis://{}:{}", config.host, config.port);
        let client = redis::Client::open(url.as_str())
            .map_err(|e| StoreError::Cache(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Cache(format!("connecting to {url}: {e}")))?;
        debug!(%url, "cache connected");
        Ok(Self { manager, ttl_secs: config.ttl_secs })
    }

    fn event_key(hash: &ContentHash) -> String {
        format!("event:{hash}")
    }

    fn cid_key(hash: &ContentHash) -> String {
        format!("ipfs:hash:{hash}")
    }

    async fn get_with_retry(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut attempt = 0;
        loop {
            let mut conn = self.manager.clone();
            match conn.get::<_, Option<String>>(key).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < RETRY_ATTEMPTS => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    warn!(key, attempt, error = %e, delay_ms = delay.as_millis() as u64,
                          "cache read failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(StoreError::Cache(e.to_string())),
            }
        }
    }

    async fn set_with_retry(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            let mut conn = self.manager.clone();
            match conn
                .set_ex::<_, _, ()>(key, value, self.ttl_secs)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if attempt + 1 < RETRY_ATTEMPTS => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    warn!(key, attempt, error = %e, delay_ms = delay.as_millis() as u64,
                          "cache write failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(StoreError::Cache(e.to_string())),
            }
        }
    }
}

fn retry_delay(attempt: u32) -> Duration {
    let exp = RETRY_BASE_MS.saturating_mul(1 << attempt).min(RETRY_CAP_MS);
    let jitter = rand::thread_rng().gen_range(0..=exp / 4);
    Duration::from_millis(exp + jitter)
}

#[async_trait]
impl CacheTier for RedisCache {
    async fn get_event(&self, hash: &ContentHash) -> Result<Option<String>, StoreError> {
        self.get_with_retry(&Self::event_key(hash)).await
    }

    async fn put_event(&self, hash: &ContentHash, body: &str) -> Result<(), StoreError> {
        self.set_with_retry(&Self::event_key(hash), body).await
    }

    async fn get_cid(&self, hash: &ContentHash) -> Result<Option<String>, StoreError> {
        self.get_with_retry(&Self::cid_key(hash)).await
    }

    async fn put_cid(&self, hash: &ContentHash, cid: &str) -> Result<(), StoreError> {
        self.set_with_retry(&Self::cid_key(hash), cid).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Cache(e.to_string()))
    }
}
