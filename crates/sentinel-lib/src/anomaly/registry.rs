//! Per-device window registry
//!
//! Owns every [`RollingWindow`], creating one lazily the first time a device
//! is observed. Entries are never removed.

use super::window::{RollingWindow, WINDOW_CAPACITY};
use crate::models::WindowStats;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Shared handle to a single device window
pub type WindowHandle = Arc<Mutex<RollingWindow>>;

/// Concurrent map of device id -> rolling window
#[derive(Debug)]
pub struct WindowRegistry {
    windows: DashMap<String, WindowHandle>,
    window_capacity: usize,
}

impl WindowRegistry {
    /// Create an empty registry whose windows hold `window_capacity` values
    pub fn new(window_capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            window_capacity: window_capacity.max(1),
        }
    }

    /// Return the window for `entity`, creating an empty one on first access
    ///
    /// Creation goes through the shard-locked entry API, so concurrent first
    /// accesses for the same device all receive the same window.
    pub fn get_or_create(&self, entity: &str) -> WindowHandle {
        if let Some(existing) = self.windows.get(entity) {
            return Arc::clone(existing.value());
        }

        let handle = self
            .windows
            .entry(entity.to_string())
            .or_insert_with(|| {
                debug!(device = %entity, "Tracking new device");
                Arc::new(Mutex::new(RollingWindow::new(self.window_capacity)))
            });
        Arc::clone(handle.value())
    }

    /// Feed one value into the device's window as a single locked update
    pub fn observe(&self, entity: &str, value: f64) -> WindowStats {
        let handle = self.get_or_create(entity);
        let mut window = handle.lock().unwrap_or_else(PoisonError::into_inner);
        window.observe(value)
    }

    /// Read-only snapshot of a device's window, if it is tracked
    pub fn stats(&self, entity: &str) -> Option<WindowStats> {
        let handle = self.windows.get(entity).map(|r| Arc::clone(r.value()))?;
        let window = handle.lock().unwrap_or_else(PoisonError::into_inner);
        Some(window.stats())
    }

    /// Number of devices currently tracked (snapshot, not linearizable)
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Ids of all tracked devices
    pub fn entities(&self) -> Vec<String> {
        self.windows.iter().map(|r| r.key().clone()).collect()
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}
