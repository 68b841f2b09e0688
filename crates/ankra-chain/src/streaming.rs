use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use ankra_core::{
    AnchoredEvent, ACTION_PUT, ANCHOR_ACTIONS, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_MAX_MESSAGES_IN_FLIGHT, DEFAULT_RECONNECT_DELAY_SECS,
};
use ankra_crypto::{parse_hash, sha256};
use ankra_ingest::IngestProcessor;

use crate::source::{SourceError, SourceKind, SourceStatsSnapshot};

#[derive(Clone, Debug)]
pub struct StreamingConfig {
    /// Block-trace WebSocket endpoint, e.g. `ws://127.0.0.1:8080`.
    pub ship_url: String,
    pub contract_account: String,
    pub start_block: u64,
    /// 0 means "no upper bound".
    pub end_block: u64,
    pub max_messages_in_flight: u32,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub tls_ca_path: Option<PathBuf>,
    pub tls_verify: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            ship_url: "ws://127.0.0.1:8080".into(),
            contract_account: String::new(),
            start_block: 0,
            end_block: 0,
            max_messages_in_flight: DEFAULT_MAX_MESSAGES_IN_FLIGHT,
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            tls_ca_path: None,
            tls_verify: true,
        }
    }
}

#[derive(Default)]
struct SourceStats {
    blocks: AtomicU64,
    anchors: AtomicU64,
    reconnects: AtomicU64,
}

enum SessionEnd {
    Shutdown,
    RangeComplete,
}

/// Streaming chain source.
///
/// Subscribes to a block-trace WebSocket with a bounded in-flight window,
/// extracts anchor actions for the configured contract, normalizes them and
/// feeds the ingestion processor. Disconnects trigger reconnects with a
/// linearly growing delay up to an attempt cap; a binary frame is fatal.
pub struct StreamingSource {
    config: StreamingConfig,
    processor: Arc<IngestProcessor>,
    stats: SourceStats,
}

impl StreamingSource {
    pub fn new(config: StreamingConfig, processor: Arc<IngestProcessor>) -> Self {
        Self { config, processor, stats: SourceStats::default() }
    }

    pub fn stats(&self) -> SourceStatsSnapshot {
        SourceStatsSnapshot {
            blocks: self.stats.blocks.load(Ordering::Relaxed),
            anchors: self.stats.anchors.load(Ordering::Relaxed),
            reconnects: self.stats.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Run until the block range completes, shutdown is signalled, or a
    /// fatal error occurs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SourceError> {
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            match self.session(&mut shutdown).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::RangeComplete) => {
                    info!(end_block = self.config.end_block, "block range complete");
                    return Ok(());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.max_reconnect_attempts {
                        return Err(SourceError::ReconnectExhausted { attempts: attempt - 1 });
                    }
                    self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    let delay = self.config.reconnect_delay * attempt;
                    warn!(attempt, delay_secs = delay.as_secs(), error = %e,
                          "stream disconnected, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        }
    }

    async fn session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, SourceError> {
        let ws = self.connect().await?;
        let (mut write, mut read) = ws.split();

        let request = json!([
            "get_blocks_request_v0",
            {
                "start_block_num": self.config.start_block,
                "end_block_num": if self.config.end_block == 0 { u32::MAX as u64 } else { self.config.end_block },
                "max_messages_in_flight": self.config.max_messages_in_flight,
                "have_positions": [],
                "irreversible_only": false,
                "fetch_block": true,
                "fetch_traces": true,
                "fetch_deltas": false
            }
        ]);
        write
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| SourceError::WebSocket(e.to_string()))?;
        info!(url = %self.config.ship_url, start_block = self.config.start_block,
              window = self.config.max_messages_in_flight, "block stream subscribed");

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
                frame = read.next() => {
                    let message = match frame {
                        None => return Err(SourceError::WebSocket("connection closed".into())),
                        Some(Err(e)) => return Err(SourceError::WebSocket(e.to_string())),
                        Some(Ok(m)) => m,
                    };
                    match message {
                        Message::Text(text) => {
                            let done = self.handle_frame(&text).await?;
                            let ack = json!(["get_blocks_ack_request_v0", { "num_messages": 1 }]);
                            write
                                .send(Message::Text(ack.to_string()))
                                .await
                                .map_err(|e| SourceError::WebSocket(e.to_string()))?;
                            if done {
                                return Ok(SessionEnd::RangeComplete);
                            }
                        }
                        Message::Binary(_) => return Err(SourceError::BinaryFramesUnsupported),
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                        Message::Close(_) => {
                            return Err(SourceError::WebSocket("server closed stream".into()))
                        }
                    }
                }
            }
        }
    }

    async fn connect(
        &self,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, SourceError> {
        let url = self.config.ship_url.as_str();
        let needs_custom_tls = url.starts_with("wss")
            && (self.config.tls_ca_path.is_some() || !self.config.tls_verify);

        let (ws, _) = if needs_custom_tls {
            let mut builder = native_tls::TlsConnector::builder();
            if let Some(path) = &self.config.tls_ca_path {
                let pem = std::fs::read(path)
                    .map_err(|e| SourceError::Tls(format!("reading {}: {e}", path.display())))?;
                let cert = native_tls::Certificate::from_pem(&pem)
                    .map_err(|e| SourceError::Tls(e.to_string()))?;
                builder.add_root_certificate(cert);
            }
            if !self.config.tls_verify {
                warn!("TLS certificate verification disabled");
                builder.danger_accept_invalid_certs(true);
            }
            let connector = builder.build().map_err(|e| SourceError::Tls(e.to_string()))?;
            connect_async_tls_with_config(url, None, false, Some(Connector::NativeTls(connector)))
                .await
                .map_err(|e| SourceError::WebSocket(e.to_string()))?
        } else {
            connect_async(url)
                .await
                .map_err(|e| SourceError::WebSocket(e.to_string()))?
        };
        Ok(ws)
    }

    /// Process one JSON frame. Returns true once the configured end block
    /// has been reached.
    async fn handle_frame(&self, text: &str) -> Result<bool, SourceError> {
        let frame: Value =
            serde_json::from_str(text).map_err(|e| SourceError::Frame(e.to_string()))?;
        let Some(block) = parse_block_frame(&frame, &self.config.contract_account)? else {
            return Ok(false);
        };

        self.stats.blocks.fetch_add(1, Ordering::Relaxed);
        if !block.anchors.is_empty() {
            debug!(block_num = block.block_num, anchors = block.anchors.len(),
                   "anchors observed");
        }
        for anchored in &block.anchors {
            self.stats.anchors.fetch_add(1, Ordering::Relaxed);
            let result = self.processor.process_anchored(anchored).await;
            debug!(content_hash = %anchored.content_hash, status = %result.status,
                   block_num = block.block_num, "anchor handled");
        }
        // The secondary dedup window only needs to span one block.
        self.processor.dedup().clear_block_window();

        Ok(self.config.end_block != 0 && block.block_num + 1 >= self.config.end_block)
    }
}

// ── Frame parsing ────────────────────────────────────────────────────────────

pub(crate) struct BlockAnchors {
    pub block_num: u64,
    pub anchors: Vec<AnchoredEvent>,
}

/// Strip the `["type_name", {...}]` tagging the trace protocol applies to
/// variant records.
fn untag(value: &Value) -> &Value {
    match value.as_array() {
        Some(pair) if pair.len() == 2 && pair[0].is_string() => &pair[1],
        _ => value,
    }
}

/// Extract anchor actions for `contract` from a `get_blocks_result_v0`
/// frame. Frames without a block (end-of-stream markers, status frames)
/// yield `None`.
pub(crate) fn parse_block_frame(
    frame: &Value,
    contract: &str,
) -> Result<Option<BlockAnchors>, SourceError> {
    let Some(pair) = frame.as_array() else {
        return Err(SourceError::Frame("expected [type, payload] pair".into()));
    };
    if pair.len() != 2 || pair[0].as_str() != Some("get_blocks_result_v0") {
        debug!(frame_type = ?pair.first(), "ignoring non-block frame");
        return Ok(None);
    }
    let payload = &pair[1];

    let Some(this_block) = payload.get("this_block").filter(|b| !b.is_null()) else {
        return Ok(None);
    };
    let block_num = this_block
        .get("block_num")
        .and_then(Value::as_u64)
        .ok_or_else(|| SourceError::Frame("this_block.block_num missing".into()))?;
    let block_id = this_block
        .get("block_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let timestamp = untag(payload.get("block").unwrap_or(&Value::Null))
        .get("timestamp")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut anchors = Vec::new();
    let traces = untag(payload)
        .get("traces")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for trace in &traces {
        let trace = untag(trace);
        let trx_id = trace
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(action_traces) = trace.get("action_traces").and_then(Value::as_array) else {
            continue;
        };
        for action_trace in action_traces {
            let action_trace = untag(action_trace);
            let Some(act) = action_trace.get("act") else { continue };
            let account = act.get("account").and_then(Value::as_str).unwrap_or_default();
            let name = act.get("name").and_then(Value::as_str).unwrap_or_default();
            if account != contract || !ANCHOR_ACTIONS.contains(&name) {
                continue;
            }
            let data = act.get("data").cloned().unwrap_or(Value::Null);
            if !data.is_object() {
                // Un-decoded action data (the node lacked the ABI). The
                // anchor cannot be normalized, so it is skipped loudly.
                warn!(block_num, trx_id = %trx_id, action = name,
                      "action data is not decoded JSON, skipping anchor");
                continue;
            }
            let action_ordinal = action_trace
                .get("action_ordinal")
                .and_then(Value::as_u64)
                .unwrap_or_default() as u32;

            let payload_bytes =
                serde_json::to_vec(&data).map_err(|e| SourceError::Frame(e.to_string()))?;
            let event_hash = hex::encode(sha256(&payload_bytes));

            // The anchor's own hash field is canonical for `put`; other
            // actions are identified by their payload digest.
            let content_hash = if name == ACTION_PUT {
                match data.get("hash").map(parse_hash) {
                    Some(Ok(hash)) => hash,
                    Some(Err(e)) => {
                        warn!(block_num, trx_id = %trx_id, error = %e,
                              "put action with unparseable hash, skipping");
                        continue;
                    }
                    None => {
                        warn!(block_num, trx_id = %trx_id, "put action without hash, skipping");
                        continue;
                    }
                }
            } else {
                ankra_core::ContentHash::from_digest(sha256(&payload_bytes))
            };

            anchors.push(AnchoredEvent {
                content_hash,
                event_hash: event_hash.clone(),
                payload: data,
                block_num,
                block_id: block_id.clone(),
                trx_id: trx_id.clone(),
                action_ordinal,
                timestamp: timestamp.clone(),
                source: SourceKind::Streaming.to_string(),
                contract_account: account.to_string(),
                action_name: name.to_string(),
            });
        }
    }

    Ok(Some(BlockAnchors { block_num, anchors }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_frame(traces: Value) -> Value {
        json!([
            "get_blocks_result_v0",
            {
                "head": { "block_num": 120, "block_id": "aa" },
                "this_block": { "block_num": 100, "block_id": "00000064abcd" },
                "block": ["signed_block_v0", { "timestamp": "2026-01-01T00:00:00.000" }],
                "traces": traces,
            }
        ])
    }

    fn put_trace(hash: &str) -> Value {
        json!(["transaction_trace_v0", {
            "id": "trx-1",
            "action_traces": [["action_trace_v1", {
                "action_ordinal": 1,
                "act": {
                    "account": "ankra.events",
                    "name": "put",
                    "data": {
                        "author": "alice",
                        "type": 21,
                        "hash": hash,
                        "ts": 1_700_000_000u64,
                        "tags": []
                    }
                }
            }]]
        }])
    }

    #[test]
    fn put_action_uses_anchored_hash() {
        let digest_hex = "AA".repeat(32);
        let frame = block_frame(json!([put_trace(&digest_hex)]));
        let block = parse_block_frame(&frame, "ankra.events").unwrap().unwrap();
        assert_eq!(block.block_num, 100);
        assert_eq!(block.anchors.len(), 1);

        let anchored = &block.anchors[0];
        assert_eq!(anchored.content_hash.as_str(), "aa".repeat(32));
        // Trace identity is the payload digest, not the anchor hash.
        assert_ne!(anchored.event_hash, anchored.content_hash.as_str());
        assert_eq!(anchored.trx_id, "trx-1");
        assert_eq!(anchored.action_name, "put");
    }

    #[test]
    fn non_put_actions_hash_their_payload() {
        let frame = block_frame(json!([["transaction_trace_v0", {
            "id": "trx-2",
            "action_traces": [["action_trace_v1", {
                "action_ordinal": 3,
                "act": {
                    "account": "ankra.events",
                    "name": "vote",
                    "data": { "voter": "bob", "target": "cc".repeat(32) }
                }
            }]]
        }]]));
        let block = parse_block_frame(&frame, "ankra.events").unwrap().unwrap();
        let anchored = &block.anchors[0];
        // content_hash == sha256(payload bytes) == event_hash for non-put.
        assert_eq!(anchored.content_hash.as_str(), anchored.event_hash);
        assert_eq!(anchored.action_ordinal, 3);
    }

    #[test]
    fn foreign_contracts_and_actions_are_filtered() {
        let frame = block_frame(json!([
            ["transaction_trace_v0", {
                "id": "trx-3",
                "action_traces": [
                    ["action_trace_v1", {
                        "action_ordinal": 1,
                        "act": { "account": "other.contract", "name": "put", "data": {} }
                    }],
                    ["action_trace_v1", {
                        "action_ordinal": 2,
                        "act": { "account": "ankra.events", "name": "transfer", "data": {} }
                    }]
                ]
            }]
        ]));
        let block = parse_block_frame(&frame, "ankra.events").unwrap().unwrap();
        assert!(block.anchors.is_empty());
    }

    #[test]
    fn status_frames_are_ignored() {
        let frame = json!(["get_status_result_v0", { "head": { "block_num": 7 } }]);
        assert!(parse_block_frame(&frame, "ankra.events").unwrap().is_none());

        // End-of-range frames carry a null this_block.
        let frame = json!(["get_blocks_result_v0", { "this_block": null }]);
        assert!(parse_block_frame(&frame, "ankra.events").unwrap().is_none());
    }

    #[test]
    fn undecoded_action_data_is_skipped() {
        let frame = block_frame(json!([["transaction_trace_v0", {
            "id": "trx-4",
            "action_traces": [["action_trace_v1", {
                "action_ordinal": 1,
                "act": {
                    "account": "ankra.events",
                    "name": "put",
                    "data": "0badc0ffee"
                }
            }]]
        }]]));
        let block = parse_block_frame(&frame, "ankra.events").unwrap().unwrap();
        assert!(block.anchors.is_empty());
    }

    #[test]
    fn garbage_frames_error() {
        assert!(parse_block_frame(&json!({ "not": "a pair" }), "c").is_err());
    }
}
