//! Streaming anomaly detection
//!
//! This module provides:
//! - A fixed-capacity rolling window with O(1) mean and standard deviation
//! - A concurrent per-device registry of windows
//! - The analyzer loop that scores queued samples and records anomalies

mod analyzer;
mod registry;
mod window;

pub use analyzer::{
    Analyzer, AnalyzerConfig, AnalyzerHandle, AnalyzerLoop, AnalyzerState, DetectionMetrics,
    NoopMetrics, Z_THRESHOLD,
};
pub use registry::{WindowHandle, WindowRegistry};
pub use window::{RollingWindow, WINDOW_CAPACITY};
