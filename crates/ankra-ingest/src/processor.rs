use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use ankra_core::{
    AnchorAction, AnchoredEvent, BlockchainMetadata, ChainMetadata, EnrichedEvent, EventType,
    IngestStatus, DEFAULT_PERMISSION, MAX_PROCESSED_HASHES,
};
use ankra_crypto::{
    calculate_event_hash, parse_hash, verify_event_signature, SignatureOptions, SignatureOutcome,
};
use ankra_store::{RetrieveOptions, StoreError};

use crate::dedup::DedupState;
use crate::registry::HandlerRegistry;
use crate::result::IngestResult;
use crate::stats::{ProcessorStats, ProcessorStatsSnapshot};
use crate::traits::{Authorizer, EventRetriever};

#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub max_processed_hashes: usize,
    pub signature: SignatureOptions,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_processed_hashes: MAX_PROCESSED_HASHES,
            signature: SignatureOptions::default(),
        }
    }
}

/// Single entry point for anchors, regardless of which source observed them.
///
/// Each anchor runs the pipeline
/// dedup → retrieve → hash check → signature → authorization → type check →
/// enrich → dispatch, and every path terminates in an [`IngestResult`] —
/// per-anchor failures never propagate as errors. Multiple anchors may be
/// in flight at once; the dedup state and counters are the only shared
/// mutable state and guard themselves.
pub struct IngestProcessor {
    store: Arc<dyn EventRetriever>,
    authorizer: Arc<dyn Authorizer>,
    registry: Arc<HandlerRegistry>,
    dedup: DedupState,
    stats: ProcessorStats,
    config: ProcessorConfig,
}

impl IngestProcessor {
    pub fn new(
        store: Arc<dyn EventRetriever>,
        authorizer: Arc<dyn Authorizer>,
        registry: Arc<HandlerRegistry>,
        config: ProcessorConfig,
    ) -> Self {
        let dedup = DedupState::new(config.max_processed_hashes);
        Self { store, authorizer, registry, dedup, stats: ProcessorStats::default(), config }
    }

    pub fn dedup(&self) -> &DedupState {
        &self.dedup
    }

    pub fn stats(&self) -> ProcessorStatsSnapshot {
        self.stats.snapshot(self.dedup.clears())
    }

    /// Convenience entry for normalized source records: unwraps the action
    /// payload and carries the chain position along.
    pub async fn process_anchored(&self, anchored: &AnchoredEvent) -> IngestResult {
        let action: AnchorAction = match serde_json::from_value(anchored.payload.clone()) {
            Ok(action) => action,
            Err(e) => {
                let message = format!("malformed anchor payload: {e}");
                warn!(event_hash = %anchored.event_hash, source = %anchored.source, %message);
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                self.stats.record_error(&message);
                return IngestResult::failed(IngestStatus::Error, None, message);
            }
        };
        self.process_anchor(&action, Some(&anchored.chain_metadata())).await
    }

    /// Process one anchor end to end.
    pub async fn process_anchor(
        &self,
        action: &AnchorAction,
        meta: Option<&ChainMetadata>,
    ) -> IngestResult {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let block_num = meta.map(|m| m.block_num).unwrap_or_default();
        let trx_id = meta.map(|m| m.trx_id.as_str()).unwrap_or_default();
        let action_ordinal = meta.map(|m| m.action_ordinal).unwrap_or_default();
        let source = meta.map(|m| m.source.as_str()).unwrap_or("direct");

        // ── 1. Normalize the anchored hash ────────────────────────────────────
        let hash = match parse_hash(&action.hash) {
            Ok(hash) => hash,
            Err(e) => {
                let message = format!("unparseable anchor hash: {e}");
                warn!(author = %action.author, event_type = action.type_code, block_num, %message);
                self.stats.record_error(&message);
                return IngestResult::failed(IngestStatus::Error, None, message);
            }
        };

        info!(event_hash = %hash, event_type = action.type_code, block_num, trx_id,
              action_ordinal, source, "anchor received");

        // ── 2. Dedup ──────────────────────────────────────────────────────────
        if self.dedup.is_processed(&hash) {
            debug!(event_hash = %hash, source, "duplicate content hash");
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            return IngestResult::duplicate(&hash);
        }
        if let Some(m) = meta {
            if self.dedup.action_seen(m.block_num, &m.trx_id, m.action_ordinal, &hash) {
                debug!(event_hash = %hash, block_num, trx_id, action_ordinal,
                       "duplicate chain action");
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                return IngestResult::duplicate(&hash);
            }
        }

        // ── 3. Retrieve the body (CID path first, hash fallback) ──────────────
        let started = Instant::now();
        let opts = RetrieveOptions { require_sig: self.config.signature.require_signature };
        let mut retrieval_source: Option<String> = None;
        let mut event = None;

        if let Some(cid) = &action.event_cid {
            match self.store.retrieve_by_cid(cid).await {
                Ok(found) if found.has_signature() || !opts.require_sig => {
                    retrieval_source = Some("cid".into());
                    event = Some(found);
                }
                Ok(_) => {
                    debug!(event_hash = %hash, cid, "cid copy unsigned, using hash lookup");
                }
                Err(e) => {
                    warn!(event_hash = %hash, cid, error = %e,
                          "cid retrieval failed, falling back to hash lookup");
                }
            }
        }

        let event = match event {
            Some(event) => event,
            None => match self.store.retrieve_event(&hash, opts).await {
                Ok(retrieved) => {
                    retrieval_source = Some(retrieved.source.to_string());
                    retrieved.event
                }
                Err(e @ (StoreError::NotFound(_) | StoreError::SignatureUnavailable(_))) => {
                    info!(event_hash = %hash, source, error = %e,
                          duration_ms = started.elapsed().as_millis() as u64,
                          "event body not retrievable yet");
                    self.stats.not_found.fetch_add(1, Ordering::Relaxed);
                    return IngestResult::failed(IngestStatus::NotFound, Some(&hash), e.to_string());
                }
                Err(e) => {
                    warn!(event_hash = %hash, source, error = %e, "retrieval failed");
                    self.stats.record_error(&e.to_string());
                    return IngestResult::failed(IngestStatus::Error, Some(&hash), e.to_string());
                }
            },
        };
        let retrieval_source = retrieval_source.unwrap_or_else(|| "unknown".into());
        debug!(event_hash = %hash, retrieval_source,
               duration_ms = started.elapsed().as_millis() as u64, "event retrieved");

        // ── 4. Hash re-check ──────────────────────────────────────────────────
        match calculate_event_hash(&event) {
            Ok(actual) if actual == hash => {}
            Ok(actual) => {
                let message = format!("hash mismatch: event hashes to {actual}, anchor says {hash}");
                warn!(event_hash = %hash, %message);
                self.stats.record_error(&message);
                return IngestResult::failed(IngestStatus::Error, Some(&hash), message);
            }
            Err(e) => {
                self.stats.record_error(&e.to_string());
                return IngestResult::failed(IngestStatus::Error, Some(&hash), e.to_string());
            }
        }

        // ── 5. Signature ──────────────────────────────────────────────────────
        match verify_event_signature(&event, &self.config.signature) {
            SignatureOutcome::Verified => {}
            SignatureOutcome::Bypassed => {
                warn!(event_hash = %hash, "unsigned event accepted (dev escape)");
            }
            SignatureOutcome::Failed(reason) => {
                info!(event_hash = %hash, source, reason = %reason, "signature rejected");
                self.stats.invalid_signature.fetch_add(1, Ordering::Relaxed);
                return IngestResult::failed(
                    IngestStatus::InvalidSignature,
                    Some(&hash),
                    reason.to_string(),
                );
            }
        }

        // ── 6. Authorization ──────────────────────────────────────────────────
        // Runs for every non-failing signature outcome: a bypassed signature
        // does not waive the on-chain proof that the declared key is
        // delegated by the anchoring account.
        {
            let permission = meta
                .and_then(|m| m.permission.as_deref())
                .unwrap_or(DEFAULT_PERMISSION);
            let auth_started = Instant::now();
            let outcome = self
                .authorizer
                .verify(&action.author, permission, &event.author_pubkey)
                .await;
            debug!(event_hash = %hash, author = %action.author, permission,
                   duration_ms = auth_started.elapsed().as_millis() as u64,
                   "authorization checked");
            if let ankra_auth::AuthzOutcome::Denied { reason } = outcome {
                info!(event_hash = %hash, author = %action.author, permission, %reason,
                      "signing key not authorized");
                self.stats.unauthorized.fetch_add(1, Ordering::Relaxed);
                return IngestResult::failed(IngestStatus::UnauthorizedKey, Some(&hash), reason);
            }
        }

        // ── 7. Type cross-check ───────────────────────────────────────────────
        match EventType::from_code(action.type_code) {
            Some(expected) => {
                if !event.event_type.matches(expected) {
                    let message = format!(
                        "Type mismatch: on-chain {} ({}) vs stored {}",
                        expected.name(),
                        expected.code(),
                        event.event_type
                    );
                    warn!(event_hash = %hash, %message);
                    self.stats.record_error(&message);
                    return IngestResult::failed(IngestStatus::Error, Some(&hash), message);
                }
            }
            None => {
                // Forward compatibility: newer contract versions may anchor
                // types this build does not know yet.
                warn!(event_hash = %hash, event_type = action.type_code,
                      "unknown event type code, passing through");
            }
        }

        // ── 8. Enrich ─────────────────────────────────────────────────────────
        let enriched = EnrichedEvent {
            event,
            blockchain_verified: true,
            blockchain_metadata: BlockchainMetadata {
                anchor_hash: hash.to_string(),
                block_num,
                block_id: meta.map(|m| m.block_id.clone()).unwrap_or_default(),
                trx_id: trx_id.to_string(),
                action_ordinal,
                source: source.to_string(),
                retrieval_source: retrieval_source.clone(),
                ingested_at: chrono::Utc::now().to_rfc3339(),
            },
        };

        // ── 9. Dispatch ───────────────────────────────────────────────────────
        match self.registry.get(action.type_code) {
            Some(handler) => {
                let dispatch_started = Instant::now();
                if let Err(e) = handler.handle(&enriched).await {
                    let message = format!("handler failed: {e}");
                    warn!(event_hash = %hash, event_type = action.type_code, %message);
                    self.stats.record_error(&message);
                    return IngestResult::failed(IngestStatus::Error, Some(&hash), message);
                }
                debug!(event_hash = %hash, event_type = action.type_code,
                       duration_ms = dispatch_started.elapsed().as_millis() as u64,
                       "handler dispatched");
            }
            None => {
                warn!(event_hash = %hash, event_type = action.type_code,
                      "no handler registered, skipping dispatch");
                self.stats.no_handler.fetch_add(1, Ordering::Relaxed);
            }
        }

        // ── 10. Mark processed ────────────────────────────────────────────────
        self.dedup.mark_processed(&hash);
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        info!(event_hash = %hash, event_type = action.type_code, block_num, trx_id,
              action_ordinal, source, retrieval_source, "anchor processed");

        IngestResult::processed(&hash, action.type_code, &retrieval_source)
    }
}
