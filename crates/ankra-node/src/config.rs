use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;

use ankra_chain::SourceKind;
use ankra_core::{
    ACCOUNT_CACHE_TTL_SECS, DEFAULT_EVENT_CACHE_TTL_SECS, DEFAULT_MAX_MESSAGES_IN_FLIGHT,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_SECS, DEFAULT_STATUS_INTERVAL_SECS,
    MAX_PROCESSED_HASHES,
};

#[derive(Clone, Debug, Deserialize)]
pub struct IpfsSection {
    pub url: String,
    #[serde(default)]
    pub gateway: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct S3Section {
    #[serde(default)]
    pub endpoint: Option<String>,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheSection {
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
    #[serde(default = "default_cache_ttl")]
    pub ttl: u64,
}

/// Node configuration, loaded from a JSON file with CLI overrides applied
/// on top.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_chain_source")]
    pub chain_source: SourceKind,
    pub contract_account: String,

    #[serde(default)]
    pub start_block: u64,
    #[serde(default)]
    pub end_block: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_in_flight")]
    pub max_messages_in_flight: u32,

    #[serde(default)]
    pub ship_url: Option<String>,
    #[serde(default)]
    pub tls_ca_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    #[serde(default)]
    pub ipfs: Option<IpfsSection>,
    #[serde(default)]
    pub s3: Option<S3Section>,
    #[serde(default)]
    pub cache: Option<CacheSection>,

    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default = "default_true")]
    pub require_account_auth: bool,
    #[serde(default)]
    pub allow_unsigned_events: bool,

    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default = "default_max_processed")]
    pub max_processed_hashes: usize,
    #[serde(default = "default_account_ttl")]
    pub account_cache_ttl: u64,
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

fn default_chain_source() -> SourceKind {
    SourceKind::Streaming
}
fn default_region() -> String {
    "us-east-1".into()
}
fn default_cache_port() -> u16 {
    6379
}
fn default_cache_ttl() -> u64 {
    DEFAULT_EVENT_CACHE_TTL_SECS
}
fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}
fn default_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}
fn default_in_flight() -> u32 {
    DEFAULT_MAX_MESSAGES_IN_FLIGHT
}
fn default_true() -> bool {
    true
}
fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8099".parse().expect("static addr")
}
fn default_max_processed() -> usize {
    MAX_PROCESSED_HASHES
}
fn default_account_ttl() -> u64 {
    ACCOUNT_CACHE_TTL_SECS
}
fn default_status_interval() -> u64 {
    DEFAULT_STATUS_INTERVAL_SECS
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let config: NodeConfig =
            serde_json::from_str(&text).context("parsing config JSON")?;
        Ok(config)
    }

    /// Startup-time validation. Misconfiguration that would degrade the
    /// pipeline's guarantees is a hard failure, not a warning.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.contract_account.is_empty() {
            bail!("contract_account is required");
        }
        if self.require_account_auth && self.rpc_url.is_none() {
            bail!(
                "require_account_auth is on (the default) but no rpc_url is configured; \
                 either provide a chain RPC endpoint or explicitly opt out for dev use"
            );
        }
        if self.chain_source == SourceKind::Streaming && self.ship_url.is_none() {
            bail!("chain_source is streaming but ship_url is not configured");
        }
        if self.cache.is_none() && self.ipfs.is_none() && self.s3.is_none() {
            bail!("no event-store backend configured (need at least one of cache/ipfs/s3)");
        }
        Ok(())
    }
}
