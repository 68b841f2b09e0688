use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use ankra_core::{ContentHash, Event};
use ankra_crypto::canonical::{canonical_json, sorted_json};
use ankra_crypto::cid::cid_from_hash;
use ankra_crypto::{calculate_event_hash, hash_from_cid};

use crate::error::StoreError;
use crate::tiers::{BlockTier, CacheTier, ObjectTier, SidecarMapping};

// ── Stats ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreStats {
    stored: AtomicU64,
    retrieved: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    ipfs_stores: AtomicU64,
    s3_stores: AtomicU64,
    errors: AtomicU64,
}

#[derive(Clone, Debug, Serialize)]
pub struct StoreStatsSnapshot {
    pub stored: u64,
    pub retrieved: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub ipfs_stores: u64,
    pub s3_stores: u64,
    pub errors: u64,
}

// ── Results ──────────────────────────────────────────────────────────────────

/// Which tier served a retrieval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    Cache,
    Ipfs,
    S3,
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cache => "cache",
            Self::Ipfs => "ipfs",
            Self::S3 => "s3",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug)]
pub struct Retrieved {
    pub event: Event,
    pub source: RetrievalSource,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RetrieveOptions {
    /// Refuse canonical (signature-less) copies; fall through to a tier
    /// holding the full signed body.
    pub require_sig: bool,
}

/// Per-backend outcome of a write fan-out.
#[derive(Clone, Debug, Serialize)]
pub struct StoreOutcome {
    pub hash: ContentHash,
    pub canonical_cid: Option<String>,
    pub event_cid: Option<String>,
    pub cache_ok: bool,
    pub ipfs_ok: bool,
    pub s3_ok: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct TierHealth {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConnectivityReport {
    pub cache: Option<TierHealth>,
    pub ipfs: Option<TierHealth>,
    pub s3: Option<TierHealth>,
}

// ── EventStore ───────────────────────────────────────────────────────────────

/// Redundant three-tier event store.
///
/// Writes fan out to every configured tier in parallel and succeed when at
/// least one tier accepts. Reads fall back cache → content-addressed →
/// object store, re-check integrity on every hit, and repopulate the cache
/// from slower tiers — but only with signed bodies, so a later
/// `require_sig` read can never be poisoned by a canonical copy.
pub struct EventStore {
    cache: Option<Arc<dyn CacheTier>>,
    blocks: Option<Arc<dyn BlockTier>>,
    objects: Option<Arc<dyn ObjectTier>>,
    stats: StoreStats,
}

impl EventStore {
    pub fn new(
        cache: Option<Arc<dyn CacheTier>>,
        blocks: Option<Arc<dyn BlockTier>>,
        objects: Option<Arc<dyn ObjectTier>>,
    ) -> Self {
        Self { cache, blocks, objects, stats: StoreStats::default() }
    }

    /// The canonical content hash of an event body.
    pub fn calculate_hash(&self, event: &Event) -> Result<ContentHash, StoreError> {
        Ok(calculate_event_hash(event)?)
    }

    /// Store an event in every configured tier.
    ///
    /// When `expected_hash` is given and disagrees with the computed hash,
    /// the write fails before any backend is touched — tampered content can
    /// never land under an anchored hash.
    pub async fn store_event(
        &self,
        event: &Event,
        expected_hash: Option<&ContentHash>,
    ) -> Result<StoreOutcome, StoreError> {
        event.validate()?;
        let hash = calculate_event_hash(event)?;
        if let Some(expected) = expected_hash {
            if *expected != hash {
                return Err(StoreError::HashMismatch {
                    expected: expected.clone(),
                    actual: hash,
                });
            }
        }
        if self.cache.is_none() && self.blocks.is_none() && self.objects.is_none() {
            return Err(StoreError::NoBackend);
        }

        let value = event.to_value()?;
        let canonical = canonical_json(&value);
        let full = sorted_json(&value);

        // Raw-codec CIDs are a pure function of the block bytes, so both can
        // be derived locally; the block tier's answer is cross-checked below.
        let canonical_cid = cid_from_hash(&hash)?.to_string();
        let full_digest: [u8; 32] = Sha256::digest(full.as_bytes()).into();
        let event_cid = cid_from_hash(&ContentHash::from_digest(full_digest))?.to_string();

        let blocks_fut = async {
            let Some(blocks) = &self.blocks else { return None };
            let canonical_res = blocks.put_block(canonical.clone().into_bytes()).await;
            let full_res = blocks.put_block(full.clone().into_bytes()).await;
            match (canonical_res, full_res) {
                (Ok(got_canonical), Ok(got_full)) => {
                    if got_canonical != canonical_cid || got_full != event_cid {
                        warn!(%hash, got_canonical, got_full,
                              "block tier returned unexpected CIDs");
                    }
                    Some(true)
                }
                (a, b) => {
                    for err in [a.err(), b.err()].into_iter().flatten() {
                        warn!(%hash, error = %err, "block store failed");
                    }
                    Some(false)
                }
            }
        };

        let objects_fut = async {
            let Some(objects) = &self.objects else { return None };
            let mapping = SidecarMapping {
                hash: hash.clone(),
                cid: event_cid.clone(),
                stored_at: chrono::Utc::now().to_rfc3339(),
            };
            let body_res = objects.put_event(&hash, &full).await;
            let mapping_res = objects.put_mapping(&mapping).await;
            match (body_res, mapping_res) {
                (Ok(()), Ok(())) => Some(true),
                (a, b) => {
                    for err in [a.err(), b.err()].into_iter().flatten() {
                        warn!(%hash, error = %err, "object store failed");
                    }
                    Some(false)
                }
            }
        };

        let cache_fut = async {
            let Some(cache) = &self.cache else { return None };
            let body_res = cache.put_event(&hash, &full).await;
            let cid_res = cache.put_cid(&hash, &event_cid).await;
            match (body_res, cid_res) {
                (Ok(()), Ok(())) => Some(true),
                (a, b) => {
                    for err in [a.err(), b.err()].into_iter().flatten() {
                        warn!(%hash, error = %err, "cache store failed");
                    }
                    Some(false)
                }
            }
        };

        let (ipfs_ok, s3_ok, cache_ok) = tokio::join!(blocks_fut, objects_fut, cache_fut);

        let successes = [ipfs_ok, s3_ok, cache_ok]
            .iter()
            .filter(|r| **r == Some(true))
            .count();
        for outcome in [ipfs_ok, s3_ok, cache_ok] {
            if outcome == Some(false) {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        if successes == 0 {
            return Err(StoreError::AllBackendsFailed(hash));
        }

        self.stats.stored.fetch_add(1, Ordering::Relaxed);
        if ipfs_ok == Some(true) {
            self.stats.ipfs_stores.fetch_add(1, Ordering::Relaxed);
        }
        if s3_ok == Some(true) {
            self.stats.s3_stores.fetch_add(1, Ordering::Relaxed);
        }

        info!(%hash, cache = ?cache_ok, ipfs = ?ipfs_ok, s3 = ?s3_ok, "event stored");
        Ok(StoreOutcome {
            hash,
            canonical_cid: Some(canonical_cid),
            event_cid: Some(event_cid),
            cache_ok: cache_ok == Some(true),
            ipfs_ok: ipfs_ok == Some(true),
            s3_ok: s3_ok == Some(true),
        })
    }

    /// Retrieve an event by content hash, falling back across tiers.
    pub async fn retrieve_event(
        &self,
        hash: &ContentHash,
        opts: RetrieveOptions,
    ) -> Result<Retrieved, StoreError> {
        let mut unsigned_seen = false;

        // ── Cache tier ────────────────────────────────────────────────────────
        if let Some(cache) = &self.cache {
            match cache.get_event(hash).await {
                Ok(Some(text)) => {
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    if let Some(event) = self.decode_checked(&text, hash)? {
                        if event.has_signature() || !opts.require_sig {
                            self.stats.retrieved.fetch_add(1, Ordering::Relaxed);
                            return Ok(Retrieved { event, source: RetrievalSource::Cache });
                        }
                        unsigned_seen = true;
                    }
                }
                Ok(None) => {
                    self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(%hash, error = %e, "cache read failed, falling through");
                }
            }
        }

        // ── Content-addressed tier ────────────────────────────────────────────
        if let Some(blocks) = &self.blocks {
            // Locate the full-block CID: cached mapping first, then the
            // object-store sidecar.
            let mut full_cid: Option<String> = None;
            if let Some(cache) = &self.cache {
                match cache.get_cid(hash).await {
                    Ok(found) => full_cid = found,
                    Err(e) => warn!(%hash, error = %e, "cid mapping read failed"),
                }
            }
            if full_cid.is_none() {
                if let Some(objects) = &self.objects {
                    match objects.get_mapping(hash).await {
                        Ok(Some(mapping)) => {
                            debug!(%hash, cid = %mapping.cid, "sidecar mapping hit");
                            full_cid = Some(mapping.cid);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            self.stats.errors.fetch_add(1, Ordering::Relaxed);
                            warn!(%hash, error = %e, "sidecar mapping read failed");
                        }
                    }
                }
            }

            if let Some(cid) = full_cid {
                if let Some(event) = self.block_lookup(blocks.as_ref(), &cid, hash).await? {
                    if event.has_signature() || !opts.require_sig {
                        self.repopulate_cache(hash, &event).await;
                        self.stats.retrieved.fetch_add(1, Ordering::Relaxed);
                        return Ok(Retrieved { event, source: RetrievalSource::Ipfs });
                    }
                    unsigned_seen = true;
                }
            }

            // Canonical block derived from the hash itself: always
            // signature-less, so only useful for relaxed reads.
            if !opts.require_sig && hash.digest32().is_ok() {
                let canonical_cid = cid_from_hash(hash)?.to_string();
                if let Some(event) =
                    self.block_lookup(blocks.as_ref(), &canonical_cid, hash).await?
                {
                    self.stats.retrieved.fetch_add(1, Ordering::Relaxed);
                    return Ok(Retrieved { event, source: RetrievalSource::Ipfs });
                }
            }
        }

        // ── Object tier ───────────────────────────────────────────────────────
        if let Some(objects) = &self.objects {
            match objects.get_event(hash).await {
                Ok(Some(text)) => {
                    if let Some(event) = self.decode_checked(&text, hash)? {
                        if event.has_signature() {
                            self.repopulate_cache(hash, &event).await;
                        }
                        if event.has_signature() || !opts.require_sig {
                            self.stats.retrieved.fetch_add(1, Ordering::Relaxed);
                            return Ok(Retrieved { event, source: RetrievalSource::S3 });
                        }
                        unsigned_seen = true;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(%hash, error = %e, "object read failed");
                }
            }
        }

        if unsigned_seen {
            Err(StoreError::SignatureUnavailable(hash.clone()))
        } else {
            Err(StoreError::NotFound(hash.clone()))
        }
    }

    /// Fetch directly from the content-addressed tier and validate structure.
    pub async fn retrieve_by_cid(&self, cid: &str) -> Result<Event, StoreError> {
        let blocks = self.blocks.as_ref().ok_or(StoreError::NoBackend)?;
        let bytes = blocks
            .get_block(cid)
            .await?
            .ok_or_else(|| match hash_from_cid(cid) {
                Ok(hash) => StoreError::NotFound(hash),
                Err(e) => StoreError::Ipfs(format!("block {cid} unavailable ({e})")),
            })?;
        let event = Event::from_value(
            serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Ipfs(format!("block {cid} is not JSON: {e}")))?,
        )?;
        event.validate()?;
        self.stats.retrieved.fetch_add(1, Ordering::Relaxed);
        Ok(event)
    }

    pub async fn test_connectivity(&self) -> ConnectivityReport {
        async fn probe<F>(fut: Option<F>) -> Option<TierHealth>
        where
            F: std::future::Future<Output = Result<(), StoreError>>,
        {
            match fut {
                None => None,
                Some(f) => Some(match f.await {
                    Ok(()) => TierHealth { ok: true, error: None },
                    Err(e) => TierHealth { ok: false, error: Some(e.to_string()) },
                }),
            }
        }

        let (cache, ipfs, s3) = tokio::join!(
            probe(self.cache.as_ref().map(|c| c.ping())),
            probe(self.blocks.as_ref().map(|b| b.ping())),
            probe(self.objects.as_ref().map(|o| o.ping())),
        );
        ConnectivityReport { cache, ipfs, s3 }
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            stored: self.stats.stored.load(Ordering::Relaxed),
            retrieved: self.stats.retrieved.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            ipfs_stores: self.stats.ipfs_stores.load(Ordering::Relaxed),
            s3_stores: self.stats.s3_stores.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }

    /// Backend clients shut down on drop; this exists for lifecycle symmetry
    /// and final logging.
    pub async fn close(&self) {
        info!(stats = ?self.stats(), "event store closed");
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Parse a tier's copy and re-check integrity. A hash mismatch is fatal;
    /// an unparseable copy is logged and skipped so other tiers can answer.
    fn decode_checked(
        &self,
        text: &str,
        hash: &ContentHash,
    ) -> Result<Option<Event>, StoreError> {
        let event = match serde_json::from_str::<serde_json::Value>(text)
            .map_err(|e| e.to_string())
            .and_then(|v| Event::from_value(v).map_err(|e| e.to_string()))
        {
            Ok(event) => event,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(%hash, error = %e, "stored copy is unparseable, skipping tier");
                return Ok(None);
            }
        };
        let actual = calculate_event_hash(&event)?;
        if actual != *hash {
            return Err(StoreError::HashMismatch { expected: hash.clone(), actual });
        }
        Ok(Some(event))
    }

    async fn block_lookup(
        &self,
        blocks: &dyn BlockTier,
        cid: &str,
        hash: &ContentHash,
    ) -> Result<Option<Event>, StoreError> {
        match blocks.get_block(cid).await {
            Ok(Some(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.decode_checked(text, hash),
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(%hash, cid, error = %e, "block is not UTF-8, skipping");
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(%hash, cid, error = %e, "block read failed, falling through");
                Ok(None)
            }
        }
    }

    /// Write a retrieved body back to the cache. Only signed bodies are
    /// eligible; a canonical copy in the cache would poison later
    /// `require_sig` reads.
    async fn repopulate_cache(&self, hash: &ContentHash, event: &Event) {
        if !event.has_signature() {
            return;
        }
        let Some(cache) = &self.cache else { return };
        let Ok(value) = event.to_value() else { return };
        if let Err(e) = cache.put_event(hash, &sorted_json(&value)).await {
            warn!(%hash, error = %e, "cache repopulation failed");
        }
    }
}
