//! Streaming analyzer
//!
//! A single consumer drains the ingest queue, folds every sample into its
//! device's rolling window and flags samples whose deviation score exceeds
//! the threshold once the window has filled.

use super::registry::WindowRegistry;
use crate::ingest::QueueConsumer;
use crate::models::{AnomalyRecord, Sample};
use crate::observability::StructuredLogger;
use crate::store::TelemetryStore;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Absolute deviation score above which a sample is anomalous
pub const Z_THRESHOLD: f64 = 2.0;

/// Counters the analyzer reports to the metrics backend
pub trait DetectionMetrics: Send + Sync {
    fn inc_samples_processed(&self);
    fn inc_anomalies_detected(&self);
    fn inc_store_errors(&self);
    fn set_devices_tracked(&self, count: usize);
}

/// Metrics sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl DetectionMetrics for NoopMetrics {
    fn inc_samples_processed(&self) {}
    fn inc_anomalies_detected(&self) {}
    fn inc_store_errors(&self) {}
    fn set_devices_tracked(&self, _count: usize) {}
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Strict threshold on `|z|`
    pub z_threshold: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            z_threshold: Z_THRESHOLD,
        }
    }
}

/// Per-sample detection step with its collaborators
pub struct Analyzer {
    registry: Arc<WindowRegistry>,
    store: Arc<dyn TelemetryStore>,
    metrics: Arc<dyn DetectionMetrics>,
    logger: StructuredLogger,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(
        registry: Arc<WindowRegistry>,
        store: Arc<dyn TelemetryStore>,
        metrics: Arc<dyn DetectionMetrics>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            registry,
            store,
            metrics,
            logger,
            config: AnalyzerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<WindowRegistry> {
        &self.registry
    }

    /// Analyze one sample and return the anomaly record if it was flagged
    ///
    /// The eligibility gate looks at the window state after this sample's
    /// own update, so the call that brings the window to capacity can
    /// already flag.
    pub async fn process(&self, sample: &Sample) -> Option<AnomalyRecord> {
        if let Err(e) = self.store.record_sample(sample).await {
            self.metrics.inc_store_errors();
            self.logger
                .log_store_failure(&sample.device, "record_sample", &e);
        }

        let value = sample.value();
        let stats = self.registry.observe(sample.entity(), value);
        let z = stats.z_score(value);

        self.metrics.inc_samples_processed();
        self.metrics.set_devices_tracked(self.registry.len());

        if !(stats.is_full() && z.abs() > self.config.z_threshold) {
            return None;
        }

        let record = AnomalyRecord::from_sample(sample, z);
        self.metrics.inc_anomalies_detected();
        self.logger.log_anomaly(&sample.device, &record, &stats);

        if let Err(e) = self.store.record_anomaly(&sample.device, &record).await {
            self.metrics.inc_store_errors();
            self.logger
                .log_store_failure(&sample.device, "record_anomaly", &e);
        }

        Some(record)
    }
}

/// Lifecycle state of the analyzer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Running,
    Stopped,
}

/// Long-running consumer of the ingest queue
pub struct AnalyzerLoop {
    analyzer: Analyzer,
    consumer: QueueConsumer,
}

impl AnalyzerLoop {
    pub fn new(analyzer: Analyzer, consumer: QueueConsumer) -> Self {
        Self { analyzer, consumer }
    }

    /// Drain the queue until shutdown is signalled, the queue is closed, or
    /// all producers are gone
    ///
    /// Shutdown wins over pending samples; whatever is still queued is
    /// dropped. Returns the number of samples processed.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        info!("Starting analyzer loop");
        let mut processed = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!(processed, "Shutting down analyzer loop");
                    break;
                }
                next = self.consumer.dequeue() => match next {
                    Some(sample) => {
                        if let Some(record) = self.analyzer.process(&sample).await {
                            debug!(device = %sample.device, z = record.z, "Sample flagged");
                        }
                        processed += 1;
                    }
                    None => {
                        info!(processed, "Ingest queue closed, analyzer loop stopping");
                        break;
                    }
                }
            }
        }

        processed
    }

    /// Start the loop on the runtime and return a handle to stop it
    pub fn spawn(self) -> AnalyzerHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = Arc::new(AtomicBool::new(true));

        let guard = RunningGuard(Arc::clone(&running));
        let task = tokio::spawn(async move {
            let _guard = guard;
            self.run(shutdown_rx).await
        });

        AnalyzerHandle {
            shutdown_tx,
            running,
            task,
        }
    }
}

/// Clears the running flag when the loop task ends, including by panic
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to a spawned [`AnalyzerLoop`]
pub struct AnalyzerHandle {
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
    task: JoinHandle<u64>,
}

impl AnalyzerHandle {
    pub fn state(&self) -> AnalyzerState {
        if self.running.load(Ordering::Acquire) {
            AnalyzerState::Running
        } else {
            AnalyzerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == AnalyzerState::Running
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(self) -> Result<u64> {
        // the loop may already have exited on its own
        let _ = self.shutdown_tx.send(());
        self.task.await.context("Analyzer task failed")
    }
}
