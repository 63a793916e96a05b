//! dropline - drop report intake and live matrix push

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dropline::{
    config::Args,
    livehouse::{spawn_delta_feed, SubscriptionRegistry},
    nats::NatsClient,
    queue::{DurableQueue, JetStreamQueue, MemoryQueue, MemoryQueueMode, QueueCommitter},
    report::{ReportPipeline, ReportServices},
    server,
    services::{Catalog, MemoryAccounts, MemoryCatalog, MemoryReportStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dropline={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  dropline");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("NATS: {}", args.nats.nats_url);
    info!(
        "Live: ping every {} ms, window {} ms, queue {} frames",
        args.live_ping_interval_ms, args.live_liveness_window_ms, args.live_outbound_capacity
    );
    info!("======================================");

    let catalog = match &args.catalog_path {
        Some(path) => Catalog::from_path(path)?,
        None => {
            warn!("No CATALOG_PATH set, starting with an empty catalog");
            Catalog::default()
        }
    };
    let catalog = Arc::new(MemoryCatalog::new(catalog));
    info!(
        "Catalog loaded: {} items, {} stages",
        catalog.item_count(),
        catalog.stage_count()
    );

    // Connect to NATS (optional in dev mode)
    let nats = match NatsClient::new(&args.nats, "dropline").await {
        Ok(client) => Some(client),
        Err(e) => {
            if args.dev_mode {
                warn!("NATS connection failed (dev mode, continuing without): {}", e);
                None
            } else {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let (queue, queue_backend): (Arc<dyn DurableQueue>, &'static str) = match &nats {
        Some(client) => (Arc::new(JetStreamQueue::new(client).await?), "jetstream"),
        None => {
            warn!("Reports are queued in memory and will not be persisted");
            (Arc::new(MemoryQueue::new(MemoryQueueMode::Ack)), "memory")
        }
    };

    let store = Arc::new(MemoryReportStore::new());
    let services = ReportServices {
        accounts: Arc::new(MemoryAccounts::new()),
        items: catalog.clone(),
        stages: catalog,
        reports: store.clone(),
        hashes: store,
    };
    let pipeline = Arc::new(ReportPipeline::new(services, QueueCommitter::new(queue)));

    let live_registry = Arc::new(SubscriptionRegistry::new(args.live_outbound_capacity));
    let state = Arc::new(server::AppState::new(
        args.clone(),
        pipeline,
        Arc::clone(&live_registry),
        queue_backend,
    ));

    let feed = match nats {
        Some(client) => Some(
            spawn_delta_feed(
                client,
                args.matrix_delta_subject.clone(),
                live_registry,
                state.shutdown.clone(),
            )
            .await?,
        ),
        None => {
            warn!("Matrix delta feed disabled without NATS");
            None
        }
    };

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    server::run(state).await?;

    if let Some(feed) = feed {
        let _ = feed.await;
    }
    Ok(())
}
