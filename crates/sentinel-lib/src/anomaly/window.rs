//! Fixed-capacity rolling window
//!
//! Keeps the most recent observations of one device in a circular buffer
//! together with a running sum and sum of squares, so mean and standard
//! deviation are available in O(1) after every update.

use crate::models::WindowStats;

/// Default number of observations per window
pub const WINDOW_CAPACITY: usize = 50;

/// Circular buffer of recent values with running moments
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buffer: Vec<f64>,
    write_index: usize,
    count: usize,
    sum: f64,
    sum_of_squares: f64,
}

impl RollingWindow {
    /// Create an empty window holding at most `capacity` values (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_index: 0,
            count: 0,
            sum: 0.0,
            sum_of_squares: 0.0,
        }
    }

    /// Record a value and return the statistics right after this update
    ///
    /// When the window is full the value at the write position is evicted
    /// first and its contribution removed from both running sums. Each time
    /// the write position wraps, both sums are rebuilt from the buffer so
    /// rounding left behind by an evicted outlier does not outlive it.
    /// Non-finite values are ignored.
    pub fn observe(&mut self, value: f64) -> WindowStats {
        if !value.is_finite() {
            return self.stats();
        }

        let capacity = self.buffer.len();
        if self.count < capacity {
            self.count += 1;
        } else {
            let evicted = self.buffer[self.write_index];
            self.sum -= evicted;
            self.sum_of_squares -= evicted * evicted;
        }

        self.buffer[self.write_index] = value;
        self.sum += value;
        self.sum_of_squares += value * value;
        self.write_index = (self.write_index + 1) % capacity;
        if self.write_index == 0 {
            self.resync();
        }

        self.stats()
    }

    /// Rebuild the running sums from the buffered values
    fn resync(&mut self) {
        let live = &self.buffer[..self.count];
        self.sum = live.iter().sum();
        self.sum_of_squares = live.iter().map(|v| v * v).sum();
    }

    /// Current statistics without mutating the window
    pub fn stats(&self) -> WindowStats {
        let capacity = self.buffer.len();
        if self.count == 0 {
            return WindowStats {
                mean: 0.0,
                std_dev: 0.0,
                count: 0,
                capacity,
            };
        }

        let n = self.count as f64;
        let mean = self.sum / n;
        let std_dev = if self.count > 1 {
            // cancellation can push this slightly below zero
            let variance = (self.sum_of_squares / n - mean * mean).max(0.0);
            variance.sqrt()
        } else {
            0.0
        };

        WindowStats {
            mean,
            std_dev,
            count: self.count,
            capacity,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.buffer.len()
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_of_squares(&self) -> f64 {
        self.sum_of_squares
    }

    /// Buffered values ordered oldest to newest
    pub fn values(&self) -> Vec<f64> {
        if self.is_full() {
            let (newer, older) = self.buffer.split_at(self.write_index);
            older.iter().chain(newer.iter()).copied().collect()
        } else {
            self.buffer[..self.count].to_vec()
        }
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}
