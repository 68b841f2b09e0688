use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use ankra_chain::{SourceKind, SourceManager, SourceStatsSnapshot};
use ankra_core::AnchoredEvent;
use ankra_ingest::{IngestProcessor, IngestResult, ProcessorStatsSnapshot};
use ankra_store::{ConnectivityReport, EventStore, StoreStatsSnapshot};

/// Shared state behind the HTTP surface.
pub struct ApiState {
    pub processor: Arc<IngestProcessor>,
    pub store: Arc<EventStore>,
    pub manager: Arc<SourceManager>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub active_source: Option<SourceKind>,
    pub processor: ProcessorStatsSnapshot,
    pub store: StoreStatsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<SourceStatsSnapshot>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest", post(ingest))
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `addr`; resolves after a graceful shutdown signal.
pub async fn serve(
    state: Arc<ApiState>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    info!("API server stopped");
    Ok(())
}

/// Push webhook: an external chain reader delivers normalized anchor
/// records here. The response carries the processor's own vocabulary.
async fn ingest(
    State(state): State<Arc<ApiState>>,
    Json(anchored): Json<AnchoredEvent>,
) -> Json<IngestResult> {
    info!(content_hash = %anchored.content_hash, source = %anchored.source,
          block_num = anchored.block_num, "anchor pushed");
    Json(state.processor.process_anchored(&anchored).await)
}

async fn healthz(
    State(state): State<Arc<ApiState>>,
) -> (StatusCode, Json<ConnectivityReport>) {
    let report = state.store.test_connectivity().await;
    let healthy = [&report.cache, &report.ipfs, &report.s3]
        .iter()
        .all(|tier| tier.as_ref().map(|t| t.ok).unwrap_or(true));
    let code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(report))
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        active_source: state.manager.active_kind().await,
        processor: state.processor.stats(),
        store: state.store.stats(),
        streaming: state.manager.streaming_stats().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use ankra_auth::AuthzOutcome;
    use ankra_chain::StreamingConfig;
    use ankra_core::{ContentHash, Event};
    use ankra_ingest::{Authorizer, EventRetriever, HandlerRegistry, ProcessorConfig};
    use ankra_store::{Retrieved, RetrieveOptions, StoreError};

    struct EmptyStore;

    #[async_trait]
    impl EventRetriever for EmptyStore {
        async fn retrieve_event(
            &self,
            hash: &ContentHash,
            _opts: RetrieveOptions,
        ) -> Result<Retrieved, StoreError> {
            Err(StoreError::NotFound(hash.clone()))
        }
        async fn retrieve_by_cid(&self, cid: &str) -> Result<Event, StoreError> {
            Err(StoreError::Ipfs(format!("block {cid} unavailable")))
        }
    }

    struct AllowAll;

    #[async_trait]
    impl Authorizer for AllowAll {
        async fn verify(&self, _: &str, _: &str, _: &str) -> AuthzOutcome {
            AuthzOutcome::Authorized
        }
    }

    fn state() -> Arc<ApiState> {
        let processor = Arc::new(IngestProcessor::new(
            Arc::new(EmptyStore),
            Arc::new(AllowAll),
            Arc::new(HandlerRegistry::new()),
            ProcessorConfig::default(),
        ));
        let (fatal_tx, _rx) = mpsc::channel(1);
        let manager = Arc::new(SourceManager::new(
            processor.clone(),
            StreamingConfig::default(),
            fatal_tx,
        ));
        Arc::new(ApiState {
            processor,
            store: Arc::new(EventStore::new(None, None, None)),
            manager,
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ingest_returns_processor_vocabulary() {
        let app = router(state());
        let anchored = json!({
            "content_hash": "ab".repeat(32),
            "event_hash": "trace",
            "payload": {
                "author": "alice",
                "type": 21,
                "hash": "ab".repeat(32),
                "ts": 1_700_000_000u64,
                "tags": []
            },
            "block_num": 7,
            "block_id": "07",
            "trx_id": "trx",
            "action_ordinal": 1,
            "timestamp": "2026-01-01T00:00:00Z",
            "source": "push",
            "contract_account": "ankra.events",
            "action_name": "put"
        });
        let response = app
            .oneshot(
                Request::post("/ingest")
                    .header("content-type", "application/json")
                    .body(Body::from(anchored.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // The body is nowhere to be found, which is a retryable condition.
        assert_eq!(body["status"], "not_found");
        assert_eq!(body["contentHash"], "ab".repeat(32));
    }

    #[tokio::test]
    async fn healthz_is_ok_with_no_tiers_configured() {
        let app = router(state());
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_exposes_counters() {
        let app = router(state());
        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["processor"]["received"], 0);
        assert_eq!(body["store"]["stored"], 0);
        assert!(body["active_source"].is_null());
    }
}
