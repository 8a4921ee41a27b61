//! Observability infrastructure for the sentinel service
//!
//! Provides:
//! - Prometheus metrics (received volume, anomalies, request latency, queue depth)
//! - Structured JSON event logging with tracing

use crate::anomaly::DetectionMetrics;
use crate::models::{AnomalyRecord, WindowStats};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for request handling latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    rps_total: IntCounter,
    samples_received: IntCounter,
    samples_processed: IntCounter,
    samples_dropped: IntCounterVec,
    anomalies: IntCounter,
    store_errors: IntCounter,
    handle_latency_seconds: Histogram,
    devices_tracked: IntGauge,
    queue_depth: IntGauge,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            rps_total: register_int_counter!(
                "service_rps_total",
                "Total RPS received"
            )
            .expect("Failed to register service_rps_total"),

            samples_received: register_int_counter!(
                "service_samples_received_total",
                "Samples accepted at the ingest endpoint"
            )
            .expect("Failed to register service_samples_received_total"),

            samples_processed: register_int_counter!(
                "service_samples_processed_total",
                "Samples analyzed by the rolling window detector"
            )
            .expect("Failed to register service_samples_processed_total"),

            samples_dropped: register_int_counter_vec!(
                "service_samples_dropped_total",
                "Samples dropped before analysis",
                &["reason"]
            )
            .expect("Failed to register service_samples_dropped_total"),

            anomalies: register_int_counter!(
                "service_anomalies_total",
                "Total detected anomalies"
            )
            .expect("Failed to register service_anomalies_total"),

            store_errors: register_int_counter!(
                "service_store_errors_total",
                "Failed writes to the telemetry store"
            )
            .expect("Failed to register service_store_errors_total"),

            handle_latency_seconds: register_histogram!(
                "service_handle_latency_seconds",
                "Latency for handling requests",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register service_handle_latency_seconds"),

            devices_tracked: register_int_gauge!(
                "service_devices_tracked",
                "Devices with a rolling window"
            )
            .expect("Failed to register service_devices_tracked"),

            queue_depth: register_int_gauge!(
                "service_queue_depth",
                "Samples waiting in the ingest queue"
            )
            .expect("Failed to register service_queue_depth"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a metrics handle, registering the collectors on first call
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    /// Count an accepted sample and add its request rate to the volume counter
    pub fn record_received(&self, rps: i64) {
        self.inner().samples_received.inc();
        self.inner().rps_total.inc_by(rps.max(0) as u64);
    }

    pub fn inc_dropped(&self, reason: &str) {
        self.inner()
            .samples_dropped
            .with_label_values(&[reason])
            .inc();
    }

    pub fn observe_handle_latency(&self, duration_secs: f64) {
        self.inner().handle_latency_seconds.observe(duration_secs);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.inner().queue_depth.set(depth as i64);
    }

    pub fn anomalies_total(&self) -> u64 {
        self.inner().anomalies.get()
    }
}

impl DetectionMetrics for ServiceMetrics {
    fn inc_samples_processed(&self) {
        self.inner().samples_processed.inc();
    }

    fn inc_anomalies_detected(&self) {
        self.inner().anomalies.inc();
    }

    fn inc_store_errors(&self) {
        self.inner().store_errors.inc();
    }

    fn set_devices_tracked(&self, count: usize) {
        self.inner().devices_tracked.set(count as i64);
    }
}

/// Structured logger for service events
///
/// Every event carries an `event` field and the instance name so log
/// pipelines can filter without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            version = %version,
            listen_addr = %listen_addr,
            "Telemetry sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Telemetry sentinel shutting down"
        );
    }

    /// Log a flagged sample together with the window it was scored against
    pub fn log_anomaly(&self, device: &str, record: &AnomalyRecord, stats: &WindowStats) {
        warn!(
            event = "anomaly_detected",
            instance = %self.instance,
            device = %device,
            ts = record.ts,
            rps = record.rps,
            z_score = record.z,
            mean = stats.mean,
            std_dev = stats.std_dev,
            "Anomalous request rate detected"
        );
    }

    /// Log a store write that was dropped
    pub fn log_store_failure(&self, device: &str, operation: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "store_write_failed",
            instance = %self.instance,
            device = %device,
            operation = %operation,
            error = %error,
            "Telemetry store write failed, record discarded"
        );
    }

    pub fn log_snapshot(&self, path: &str, records: usize, success: bool) {
        if success {
            info!(
                event = "store_snapshot",
                instance = %self.instance,
                path = %path,
                records = records,
                "Store snapshot written"
            );
        } else {
            warn!(
                event = "store_snapshot_failed",
                instance = %self.instance,
                path = %path,
                records = records,
                "Store snapshot failed, will retry on next interval"
            );
        }
    }
}
