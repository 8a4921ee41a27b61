//! Telemetry sentinel - streaming anomaly detection for device telemetry
//!
//! Accepts per-device samples over HTTP, keeps a rolling profile per device
//! and flags request rates that deviate from recent history.

use anyhow::{Context, Result};
use sentinel::{api, ServiceConfig};
use sentinel_lib::{
    anomaly::{Analyzer, AnalyzerLoop, WindowRegistry},
    health::{components, HealthRegistry},
    ingest::IngestQueue,
    observability::{ServiceMetrics, StructuredLogger},
    store::{MemoryStore, SnapshotWorker},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting telemetry sentinel");

    let config = ServiceConfig::load()?;
    let bind_addr = config.bind_addr();
    info!(
        instance = %config.instance_name,
        queue_capacity = config.queue_capacity,
        snapshot_path = ?config.snapshot_path,
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all(&components::ALL).await;

    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    // Core pipeline: queue -> analyzer -> windows + store
    let store = Arc::new(MemoryStore::open(config.store_config()));
    let windows = Arc::new(WindowRegistry::default());
    let (queue, consumer) = IngestQueue::bounded(config.queue_capacity);

    let analyzer = Analyzer::new(
        windows.clone(),
        store.clone(),
        Arc::new(metrics.clone()),
        logger.clone(),
    );
    let analyzer_handle = AnalyzerLoop::new(analyzer, consumer).spawn();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let snapshot_handle = tokio::spawn(
        SnapshotWorker::new(store.clone(), health_registry.clone(), logger.clone())
            .run(shutdown_tx.subscribe()),
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        queue.clone(),
        windows,
        store,
    ));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    let mut server_shutdown = shutdown_tx.subscribe();
    let mut server_handle = tokio::spawn(api::serve(listener, app_state, async move {
        let _ = server_shutdown.recv().await;
    }));

    health_registry.set_ready(true).await;
    logger.log_startup(SERVICE_VERSION, &bind_addr);

    let reason = shutdown_signal().await;
    logger.log_shutdown(reason);

    // Stop taking samples first; closing the queue also ends the analyzer loop
    health_registry.set_ready(false).await;
    queue.close();
    health_registry
        .set_unhealthy(components::INGEST, "queue closed")
        .await;
    let _ = shutdown_tx.send(());

    match analyzer_handle.stop().await {
        Ok(processed) => info!(processed, "Analyzer stopped"),
        Err(e) => warn!(error = %e, "Analyzer did not stop cleanly"),
    }
    health_registry
        .set_unhealthy(components::ANALYZER, "stopped")
        .await;

    match tokio::time::timeout(config.shutdown_timeout(), &mut server_handle).await {
        Ok(Ok(Ok(()))) => info!("API server stopped"),
        Ok(Ok(Err(e))) => warn!(error = %e, "API server exited with error"),
        Ok(Err(e)) => warn!(error = %e, "API server task failed"),
        Err(_) => {
            warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "API server did not finish in time, aborting"
            );
            server_handle.abort();
        }
    }

    if let Err(e) = snapshot_handle.await {
        warn!(error = %e, "Snapshot worker task failed");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM and name the one that arrived
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}
