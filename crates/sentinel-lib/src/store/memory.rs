//! In-process list store with optional on-disk snapshots
//!
//! Mirrors the push-front/trim semantics of a key-value list store: every
//! key holds a bounded list of serialized JSON records, newest first.
//! When a snapshot path is configured the whole store can be flushed to disk
//! and is reloaded on the next start.

use super::{anomaly_key, history_key, StoreError, TelemetryStore};
use crate::models::{AnomalyRecord, Sample};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Samples kept per device
pub const SAMPLE_HISTORY_CAPACITY: usize = 200;

/// Anomalies kept per device
pub const ANOMALY_LOG_CAPACITY: usize = 1000;

/// Configuration for the memory store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum samples retained per device
    pub history_capacity: usize,
    /// Maximum anomalies retained per device
    pub anomaly_capacity: usize,
    /// Snapshot file (snapshots disabled when `None`)
    pub snapshot_path: Option<PathBuf>,
    /// Interval between snapshot flushes
    pub flush_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: SAMPLE_HISTORY_CAPACITY,
            anomaly_capacity: ANOMALY_LOG_CAPACITY,
            snapshot_path: None,
            flush_interval: Duration::from_secs(60),
        }
    }
}

/// Bounded per-key lists of serialized records
pub struct MemoryStore {
    lists: DashMap<String, VecDeque<String>>,
    config: StoreConfig,
    dirty: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store without loading any snapshot
    pub fn new(config: StoreConfig) -> Self {
        Self {
            lists: DashMap::new(),
            config,
            dirty: AtomicBool::new(false),
        }
    }

    /// Create a store and load the configured snapshot if there is one
    pub fn open(config: StoreConfig) -> Self {
        let store = Self::new(config);

        if let Some(path) = store.config.snapshot_path.clone() {
            if path.exists() {
                if let Err(e) = store.load_from_disk(&path) {
                    warn!(error = %e, path = %path.display(), "Failed to load store snapshot, starting fresh");
                }
            }
        }

        store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Push a serialized record to the front of `key` and trim to `capacity`
    fn push_front(&self, key: String, record: String, capacity: usize) {
        let mut list = self.lists.entry(key).or_default();
        list.push_front(record);
        list.truncate(capacity);
        self.dirty.store(true, Ordering::Release);
    }

    /// Decode up to `limit` records of `key`, newest first
    fn read<T: DeserializeOwned>(&self, key: &str, limit: usize) -> Vec<T> {
        let Some(list) = self.lists.get(key) else {
            return Vec::new();
        };

        let records = list
            .iter()
            .take(limit)
            .filter_map(|raw| match serde_json::from_str(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping undecodable record");
                    None
                }
            })
            .collect();
        records
    }

    /// Number of records stored under `key`
    pub fn list_len(&self, key: &str) -> usize {
        self.lists.get(key).map(|l| l.len()).unwrap_or(0)
    }

    /// Total number of records across all keys
    pub fn total_records(&self) -> usize {
        self.lists.iter().map(|l| l.value().len()).sum()
    }

    /// True when there are writes not yet flushed to the snapshot
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write the store to its snapshot file, if snapshots are enabled
    pub fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = self.config.snapshot_path.as_deref() else {
            return Ok(());
        };

        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        if let Err(e) = self.save_to_disk(path) {
            // keep the data marked unflushed so the next tick retries
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }

        debug!(path = %path.display(), records = self.total_records(), "Store snapshot flushed");
        Ok(())
    }

    fn save_to_disk(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let snapshot: BTreeMap<String, Vec<String>> = self
            .lists
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect();
        let json = serde_json::to_vec(&snapshot)?;

        // write to a temp file, then rename over the previous snapshot
        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;

        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn load_from_disk(&self, path: &Path) -> Result<(), StoreError> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;

        let snapshot: BTreeMap<String, Vec<String>> = serde_json::from_slice(&data)?;
        for (key, records) in snapshot {
            let capacity = if key.starts_with("anomalies:") {
                self.config.anomaly_capacity
            } else {
                self.config.history_capacity
            };
            let list: VecDeque<String> = records.into_iter().take(capacity).collect();
            self.lists.insert(key, list);
        }

        info!(path = %path.display(), keys = self.lists.len(), "Loaded store snapshot");
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn record_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        let record = serde_json::to_string(sample)?;
        self.push_front(
            history_key(&sample.device),
            record,
            self.config.history_capacity,
        );
        Ok(())
    }

    async fn record_anomaly(
        &self,
        device: &str,
        anomaly: &AnomalyRecord,
    ) -> Result<(), StoreError> {
        let record = serde_json::to_string(anomaly)?;
        self.push_front(anomaly_key(device), record, self.config.anomaly_capacity);
        Ok(())
    }

    async fn recent_samples(&self, device: &str, limit: usize) -> Result<Vec<Sample>, StoreError> {
        Ok(self.read(&history_key(device), limit))
    }

    async fn recent_anomalies(
        &self,
        device: &str,
        limit: usize,
    ) -> Result<Vec<AnomalyRecord>, StoreError> {
        Ok(self.read(&anomaly_key(device), limit))
    }
}
