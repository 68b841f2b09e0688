use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ankra_ingest::IngestProcessor;

use crate::source::{SourceError, SourceKind, SourceStatsSnapshot};
use crate::streaming::{StreamingConfig, StreamingSource};

struct ActiveSource {
    kind: SourceKind,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

/// Owns the active chain source — exactly one at a time.
///
/// Switching sources stops the current one before starting the next. The
/// handover inevitably replays some anchors; the processor's content-hash
/// and block/trx/ordinal dedup absorb the overlap, so nothing is double
/// dispatched and nothing needs to be coordinated here.
pub struct SourceManager {
    processor: Arc<IngestProcessor>,
    streaming_config: StreamingConfig,
    streaming: Mutex<Option<Arc<StreamingSource>>>,
    active: Mutex<Option<ActiveSource>>,
    /// Fatal source errors surface here for the supervisor to act on.
    fatal_tx: mpsc::Sender<SourceError>,
}

impl SourceManager {
    pub fn new(
        processor: Arc<IngestProcessor>,
        streaming_config: StreamingConfig,
        fatal_tx: mpsc::Sender<SourceError>,
    ) -> Self {
        Self {
            processor,
            streaming_config,
            streaming: Mutex::new(None),
            active: Mutex::new(None),
            fatal_tx,
        }
    }

    pub async fn active_kind(&self) -> Option<SourceKind> {
        self.active.lock().await.as_ref().map(|a| a.kind)
    }

    pub async fn streaming_stats(&self) -> Option<SourceStatsSnapshot> {
        self.streaming.lock().await.as_ref().map(|s| s.stats())
    }

    /// Start a source. A no-op if that source is already active.
    pub async fn start(&self, kind: SourceKind) -> Result<(), SourceError> {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|a| a.kind) == Some(kind) {
            return Ok(());
        }
        if active.is_some() {
            drop(active);
            self.stop().await;
            active = self.active.lock().await;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = match kind {
            SourceKind::Streaming => {
                let source = Arc::new(StreamingSource::new(
                    self.streaming_config.clone(),
                    self.processor.clone(),
                ));
                *self.streaming.lock().await = Some(source.clone());
                let fatal_tx = self.fatal_tx.clone();
                Some(tokio::spawn(async move {
                    match source.run(shutdown_rx).await {
                        Ok(()) => info!("streaming source stopped"),
                        Err(e) => {
                            warn!(error = %e, "streaming source failed");
                            let _ = fatal_tx.send(e).await;
                        }
                    }
                }))
            }
            SourceKind::Push => {
                // The push source owns no connection; an external chain
                // reader delivers normalized records through the webhook.
                info!("push source active, anchors arrive via the ingest webhook");
                None
            }
        };

        info!(source = %kind, "chain source started");
        *active = Some(ActiveSource { kind, shutdown: shutdown_tx, task });
        Ok(())
    }

    /// Gracefully stop the active source, waiting for its task to finish.
    pub async fn stop(&self) {
        let Some(active) = self.active.lock().await.take() else { return };
        info!(source = %active.kind, "stopping chain source");
        let _ = active.shutdown.send(true);
        if let Some(task) = active.task {
            if let Err(e) = task.await {
                warn!(error = %e, "source task join failed");
            }
        }
    }

    /// Stop the current source and start `kind` in its place.
    pub async fn switch_source(&self, kind: SourceKind) -> Result<(), SourceError> {
        let current = self.active_kind().await;
        if current == Some(kind) {
            return Ok(());
        }
        info!(from = ?current, to = %kind, "switching chain source");
        self.stop().await;
        self.start(kind).await
    }
}
