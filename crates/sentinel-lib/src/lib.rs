//! Core library for the telemetry sentinel
//!
//! This crate provides:
//! - Bounded, non-blocking ingestion of device samples
//! - Per-device rolling statistics and z-score anomaly detection
//! - Bounded sample and anomaly history with optional snapshots
//! - Health checks and observability

pub mod anomaly;
pub mod health;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod store;

pub use anomaly::{
    Analyzer, AnalyzerConfig, AnalyzerHandle, AnalyzerLoop, AnalyzerState, DetectionMetrics,
    RollingWindow, WindowRegistry,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use ingest::{EnqueueOutcome, IngestQueue, QueueConsumer};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use store::{MemoryStore, SnapshotWorker, StoreConfig, StoreError, TelemetryStore};
