//! Service configuration

use anyhow::{Context, Result};
use sentinel_lib::ingest::QUEUE_CAPACITY;
use sentinel_lib::store::{StoreConfig, ANOMALY_LOG_CAPACITY, SAMPLE_HISTORY_CAPACITY};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix for every setting
const ENV_PREFIX: &str = "SENTINEL";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to; `:8080` means all interfaces
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Samples the ingest queue holds before dropping
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Samples kept per device in the history store
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Anomalies kept per device in the history store
    #[serde(default = "default_anomaly_capacity")]
    pub anomaly_capacity: usize,

    /// Snapshot file for the history store
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Seconds between store snapshots
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Seconds the HTTP server gets to finish in-flight requests
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_listen_addr() -> String {
    std::env::var("SERVICE_ADDR").unwrap_or_else(|_| ":8080".to_string())
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_queue_capacity() -> usize {
    QUEUE_CAPACITY
}

fn default_history_capacity() -> usize {
    SAMPLE_HISTORY_CAPACITY
}

fn default_anomaly_capacity() -> usize {
    ANOMALY_LOG_CAPACITY
}

fn default_snapshot_interval() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    5
}

impl ServiceConfig {
    /// Load configuration from `SENTINEL_*` environment variables
    pub fn load() -> Result<Self> {
        Self::build(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Load configuration from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars.into_iter().collect())),
        )
    }

    fn build(source: config::Environment) -> Result<Self> {
        config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Bind address with a host filled in for the `:port` shorthand
    pub fn bind_addr(&self) -> String {
        if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            history_capacity: self.history_capacity,
            anomaly_capacity: self.anomaly_capacity,
            snapshot_path: self.snapshot_path.clone(),
            flush_interval: Duration::from_secs(self.snapshot_interval_secs.max(1)),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
