//! Periodic snapshot flushing for the memory store

use super::MemoryStore;
use crate::health::{components, HealthRegistry};
use crate::observability::StructuredLogger;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Background task that flushes the store on an interval and once more on
/// shutdown
pub struct SnapshotWorker {
    store: Arc<MemoryStore>,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl SnapshotWorker {
    pub fn new(store: Arc<MemoryStore>, health: HealthRegistry, logger: StructuredLogger) -> Self {
        Self {
            store,
            health,
            logger,
        }
    }

    /// Run until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let Some(path) = self.store.config().snapshot_path.clone() else {
            debug!("Store snapshots disabled");
            return;
        };

        info!(
            path = %path.display(),
            interval_secs = self.store.config().flush_interval.as_secs(),
            "Starting store snapshot worker"
        );

        let mut ticker = interval(self.store.config().flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Flushing store before shutdown");
                    self.flush_once().await;
                    break;
                }
            }
        }
    }

    /// Flush on the blocking pool and report the outcome to health
    pub async fn flush_once(&self) -> bool {
        if !self.store.is_dirty() {
            return true;
        }

        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || store.flush()).await;
        let path = self
            .store
            .config()
            .snapshot_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let records = self.store.total_records();

        match result {
            Ok(Ok(())) => {
                self.logger.log_snapshot(&path, records, true);
                self.health.set_healthy(components::STORE).await;
                true
            }
            Ok(Err(e)) => {
                self.logger.log_snapshot(&path, records, false);
                self.health
                    .set_degraded(components::STORE, format!("snapshot failed: {}", e))
                    .await;
                false
            }
            Err(e) => {
                self.logger.log_snapshot(&path, records, false);
                self.health
                    .set_degraded(components::STORE, format!("snapshot task failed: {}", e))
                    .await;
                false
            }
        }
    }
}
