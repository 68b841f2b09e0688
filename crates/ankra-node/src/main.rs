//! ankra-node — the anchor ingestion service binary.
//!
//! Startup sequence:
//!   1. Load and validate configuration (strict-mode invariants enforced here)
//!   2. Connect the three event-store tiers and probe connectivity
//!   3. Wire the authorization verifier, handler registry and processor
//!   4. Start the HTTP surface (push webhook, health, status)
//!   5. Start the configured chain source
//!   6. Supervise: periodic telemetry, fatal source errors, shutdown signals

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use ankra_api::ApiState;
use ankra_auth::{AuthorizationVerifier, AuthorizerConfig, ChainRpcClient};
use ankra_chain::{SourceManager, StreamingConfig};
use ankra_core::{EnrichedEvent, EventType};
use ankra_crypto::SignatureOptions;
use ankra_ingest::{
    EventHandler, HandlerRegistry, IngestProcessor, ProcessorConfig,
};
use ankra_store::{
    BlockTier, CacheConfig, CacheTier, EventStore, IpfsClient, IpfsConfig, ObjectTier,
    RedisCache, S3Config, S3Store,
};

use crate::config::NodeConfig;

#[derive(Parser, Debug)]
#[command(
    name = "ankra-node",
    version,
    about = "Ankra node — verified ingestion of chain-anchored content events"
)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "ankra.json")]
    config: PathBuf,

    /// Override the configured chain source (streaming | push).
    #[arg(long)]
    chain_source: Option<String>,

    /// Override the contract account to observe.
    #[arg(long)]
    contract_account: Option<String>,

    /// Override the block-trace WebSocket endpoint.
    #[arg(long)]
    ship_url: Option<String>,

    /// Override the chain RPC endpoint.
    #[arg(long)]
    rpc_url: Option<String>,

    /// Override the first block to stream from.
    #[arg(long)]
    start_block: Option<u64>,

    /// Override the HTTP listen address.
    #[arg(long)]
    listen_addr: Option<std::net::SocketAddr>,

    /// Override the log level (e.g. "debug", "ankra=trace").
    #[arg(long)]
    log_level: Option<String>,
}

/// Default sink for verified events: logs them. Deployments replace this by
/// registering their own handlers (graph writers live outside this service).
struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &EnrichedEvent) -> anyhow::Result<()> {
        info!(
            event_type = %event.event.event_type,
            anchor_hash = %event.blockchain_metadata.anchor_hash,
            block_num = event.blockchain_metadata.block_num,
            source = %event.blockchain_metadata.source,
            "verified event"
        );
        Ok(())
    }
}

fn apply_overrides(config: &mut NodeConfig, args: &Args) -> anyhow::Result<()> {
    if let Some(source) = &args.chain_source {
        config.chain_source = serde_json::from_value(serde_json::json!(source))
            .with_context(|| format!("invalid --chain-source {source}"))?;
    }
    if let Some(account) = &args.contract_account {
        config.contract_account = account.clone();
    }
    if let Some(url) = &args.ship_url {
        config.ship_url = Some(url.clone());
    }
    if let Some(url) = &args.rpc_url {
        config.rpc_url = Some(url.clone());
    }
    if let Some(block) = args.start_block {
        config.start_block = block;
    }
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(level) = &args.log_level {
        config.log_level = Some(level.clone());
    }
    Ok(())
}

async fn build_store(config: &NodeConfig) -> EventStore {
    let cache: Option<Arc<dyn CacheTier>> = match &config.cache {
        None => None,
        Some(section) => {
            let cache_config = CacheConfig {
                host: section.host.clone(),
                port: section.port,
                ttl_secs: section.ttl,
            };
            match RedisCache::connect(&cache_config).await {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    // The cache is an accelerator; the store survives on the
                    // other tiers and the sidecar mappings.
                    warn!(error = %e, "cache tier unavailable, continuing without it");
                    None
                }
            }
        }
    };

    let blocks: Option<Arc<dyn BlockTier>> = config.ipfs.as_ref().map(|section| {
        Arc::new(IpfsClient::new(&IpfsConfig {
            api_url: section.url.clone(),
            gateway_url: section.gateway.clone(),
        })) as Arc<dyn BlockTier>
    });

    let objects: Option<Arc<dyn ObjectTier>> = match &config.s3 {
        None => None,
        Some(section) => Some(Arc::new(
            S3Store::connect(&S3Config {
                endpoint: section.endpoint.clone(),
                bucket: section.bucket.clone(),
                region: section.region.clone(),
                access_key: section.access_key.clone(),
                secret_key: section.secret_key.clone(),
            })
            .await,
        ) as Arc<dyn ObjectTier>),
    };

    EventStore::new(cache, blocks, objects)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(&args.config)?;
    apply_overrides(&mut config, &args)?;

    let default_directive = config.log_level.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_directive)),
        )
        .init();

    info!("ankra node starting");
    config.validate().context("validating configuration")?;

    // ── Event store ───────────────────────────────────────────────────────────
    let store = Arc::new(build_store(&config).await);
    let connectivity = store.test_connectivity().await;
    info!(report = ?connectivity, "store connectivity probed");

    // ── Authorization ─────────────────────────────────────────────────────────
    let lookup = config
        .rpc_url
        .as_deref()
        .map(|url| Arc::new(ChainRpcClient::new(url)) as Arc<dyn ankra_auth::AccountLookup>);
    let authorizer = Arc::new(AuthorizationVerifier::new(
        lookup,
        AuthorizerConfig {
            strict: config.require_account_auth,
            cache_ttl_secs: config.account_cache_ttl,
        },
    ));
    if !config.require_account_auth {
        warn!("account authorization disabled — dev mode only");
    }

    // ── Handler registry ──────────────────────────────────────────────────────
    let sink: Arc<dyn EventHandler> = Arc::new(LoggingHandler);
    let registry = Arc::new(
        HandlerRegistry::new()
            .register(EventType::CreateReleaseBundle, sink.clone())
            .register(EventType::MintEntity, sink.clone())
            .register(EventType::ResolveId, sink.clone())
            .register(EventType::AddClaim, sink.clone())
            .register(EventType::EditClaim, sink.clone())
            .register(EventType::Vote, sink.clone())
            .register(EventType::Like, sink.clone())
            .register(EventType::Finalize, sink.clone())
            .register(EventType::MergeEntity, sink),
    );

    // ── Processor ─────────────────────────────────────────────────────────────
    let processor = Arc::new(IngestProcessor::new(
        store.clone(),
        authorizer,
        registry,
        ProcessorConfig {
            max_processed_hashes: config.max_processed_hashes,
            signature: SignatureOptions {
                require_signature: true,
                allow_unsigned: config.allow_unsigned_events,
            },
        },
    ));
    if config.allow_unsigned_events {
        warn!("unsigned events allowed — dev mode only");
    }

    // ── Chain source ──────────────────────────────────────────────────────────
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
    let streaming_config = StreamingConfig {
        ship_url: config.ship_url.clone().unwrap_or_default(),
        contract_account: config.contract_account.clone(),
        start_block: config.start_block,
        end_block: config.end_block,
        max_messages_in_flight: config.max_messages_in_flight,
        reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
        max_reconnect_attempts: config.max_reconnect_attempts,
        tls_ca_path: config.tls_ca_path.clone(),
        tls_verify: config.tls_verify,
    };
    let manager = Arc::new(SourceManager::new(
        processor.clone(),
        streaming_config,
        fatal_tx,
    ));

    // ── HTTP surface ──────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let api_state = Arc::new(ApiState {
        processor: processor.clone(),
        store: store.clone(),
        manager: manager.clone(),
    });
    let api_task = tokio::spawn(ankra_api::serve(
        api_state,
        config.listen_addr,
        shutdown_rx,
    ));

    manager
        .start(config.chain_source)
        .await
        .context("starting chain source")?;

    // ── Telemetry loop ────────────────────────────────────────────────────────
    let telemetry_processor = processor.clone();
    let telemetry_store = store.clone();
    let telemetry_manager = manager.clone();
    let mut telemetry_shutdown = shutdown_tx.subscribe();
    let telemetry_task = tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.status_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = telemetry_shutdown.changed() => return,
                _ = ticker.tick() => {
                    let p = telemetry_processor.stats();
                    let s = telemetry_store.stats();
                    let streaming = telemetry_manager.streaming_stats().await;
                    info!(
                        received = p.received, processed = p.processed,
                        duplicates = p.duplicates, not_found = p.not_found,
                        invalid_signature = p.invalid_signature,
                        unauthorized = p.unauthorized, errors = p.errors,
                        dedup_clears = p.dedup_clears,
                        stored = s.stored, retrieved = s.retrieved,
                        cache_hits = s.cache_hits, cache_misses = s.cache_misses,
                        streaming = ?streaming,
                        "status"
                    );
                }
            }
        }
    });

    info!(listen_addr = %config.listen_addr, source = %config.chain_source, "node ready");

    // ── Supervision ───────────────────────────────────────────────────────────
    let exit: anyhow::Result<()> = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
        _ = sigterm() => {
            info!("SIGTERM received");
            Ok(())
        }
        fatal = fatal_rx.recv() => match fatal {
            Some(e) => Err(anyhow::anyhow!("chain source failed: {e}")),
            None => Ok(()),
        },
    };

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    manager.stop().await;
    let _ = shutdown_tx.send(true);
    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "API server error"),
        Err(e) => warn!(error = %e, "API task join failed"),
    }
    telemetry_task.abort();
    store.close().await;

    match exit {
        Ok(()) => {
            info!("ankra node stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "ankra node exiting with failure");
            Err(e)
        }
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
