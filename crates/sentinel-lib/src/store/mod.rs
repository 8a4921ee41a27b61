//! Persistence of raw samples and anomaly records
//!
//! The analyzer writes through the [`TelemetryStore`] trait so the detection
//! math can be exercised without a real backend. Writes are fire-and-forget
//! from the analyzer's point of view: failures are logged and counted, never
//! retried.

mod memory;
mod snapshot;

pub use memory::{MemoryStore, StoreConfig, ANOMALY_LOG_CAPACITY, SAMPLE_HISTORY_CAPACITY};
pub use snapshot::SnapshotWorker;

use crate::models::{AnomalyRecord, Sample};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a telemetry store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key of a device's raw sample history
pub fn history_key(device: &str) -> String {
    format!("metrics:{}", device)
}

/// Key of a device's anomaly log
pub fn anomaly_key(device: &str) -> String {
    format!("anomalies:{}", device)
}

/// Bounded per-device history of samples and anomalies, newest first
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Append a sample to the device's bounded history
    async fn record_sample(&self, sample: &Sample) -> Result<(), StoreError>;

    /// Append an anomaly to the device's bounded anomaly log
    async fn record_anomaly(&self, device: &str, anomaly: &AnomalyRecord)
        -> Result<(), StoreError>;

    /// Most recent samples for a device, newest first
    async fn recent_samples(&self, device: &str, limit: usize) -> Result<Vec<Sample>, StoreError>;

    /// Most recent anomalies for a device, newest first
    async fn recent_anomalies(
        &self,
        device: &str,
        limit: usize,
    ) -> Result<Vec<AnomalyRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(history_key("device-1"), "metrics:device-1");
        assert_eq!(anomaly_key("device-1"), "anomalies:device-1");
    }
}
