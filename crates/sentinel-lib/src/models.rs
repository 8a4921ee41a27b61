//! Core data models for the telemetry sentinel

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One telemetry observation reported by a device
///
/// The wire shape is `{device, timestamp, cpu, rps}`. The rolling statistics
/// are keyed by `device` and computed over `rps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub device: String,
    pub timestamp: i64,
    pub cpu: f64,
    pub rps: i64,
}

/// Largest request rate accepted from a device
///
/// Squares of values up to this bound, and sums of a full window of them,
/// stay exactly representable in an `f64`.
pub const MAX_RPS: i64 = 10_000_000;

/// Reasons a sample is refused at the ingestion boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("device id must not be empty")]
    EmptyDevice,

    #[error("rps must be non-negative, got {0}")]
    NegativeRps(i64),

    #[error("rps must be at most {max}, got {0}", max = MAX_RPS)]
    RpsOutOfRange(i64),

    #[error("cpu must be a finite non-negative number, got {0}")]
    InvalidCpu(f64),
}

impl Sample {
    pub fn new(device: impl Into<String>, timestamp: i64, cpu: f64, rps: i64) -> Self {
        Self {
            device: device.into(),
            timestamp,
            cpu,
            rps,
        }
    }

    /// Entity the rolling window is scoped to
    pub fn entity(&self) -> &str {
        &self.device
    }

    /// Value fed into the rolling window
    pub fn value(&self) -> f64 {
        self.rps as f64
    }

    /// True when every numeric channel can enter the running sums safely
    pub fn is_finite(&self) -> bool {
        self.value().is_finite() && self.cpu.is_finite()
    }

    /// Validate a freshly decoded sample before it is queued
    pub fn validate(&self) -> Result<(), SampleError> {
        if self.device.trim().is_empty() {
            return Err(SampleError::EmptyDevice);
        }
        if self.rps < 0 {
            return Err(SampleError::NegativeRps(self.rps));
        }
        if self.rps > MAX_RPS {
            return Err(SampleError::RpsOutOfRange(self.rps));
        }
        if !self.cpu.is_finite() || self.cpu < 0.0 {
            return Err(SampleError::InvalidCpu(self.cpu));
        }
        Ok(())
    }
}

/// Persisted record of a flagged sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub ts: i64,
    pub rps: i64,
    pub z: f64,
}

impl AnomalyRecord {
    pub fn from_sample(sample: &Sample, z: f64) -> Self {
        Self {
            ts: sample.timestamp,
            rps: sample.rps,
            z,
        }
    }
}

/// Mean and standard deviation of a rolling window right after an update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    /// Number of valid slots in the window
    pub count: usize,
    /// Fixed window capacity
    pub capacity: usize,
}

impl WindowStats {
    /// Deviation score of `value`; zero when the window has no spread
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev == 0.0 {
            0.0
        } else {
            (value - self.mean) / self.std_dev
        }
    }

    /// True once the window has received at least `capacity` observations
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }
}
