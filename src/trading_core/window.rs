//! Fixed-capacity rolling windows over the last N sealed bars

use std::collections::VecDeque;

use crate::types::Bar;

/// Parallel CVD / close / volume buffers. All three always hold the same
/// number of entries; the oldest is evicted once capacity is reached.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    cvd: VecDeque<f64>,
    closes: VecDeque<f64>,
    volumes: VecDeque<u64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cvd: VecDeque::with_capacity(capacity),
            closes: VecDeque::with_capacity(capacity),
            volumes: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, bar: &Bar) {
        if self.cvd.len() == self.capacity {
            self.cvd.pop_front();
            self.closes.pop_front();
            self.volumes.pop_front();
        }
        self.cvd.push_back(bar.cvd as f64);
        self.closes.push_back(bar.close);
        self.volumes.push_back(bar.volume);
    }

    pub fn len(&self) -> usize {
        self.cvd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cvd.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.cvd.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// CVD values, oldest first
    pub fn cvd_values(&self) -> Vec<f64> {
        self.cvd.iter().copied().collect()
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.closes.iter().copied()
    }

    /// Closes of every bar except the newest
    pub fn prior_closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.closes.iter().take(self.closes.len().saturating_sub(1)).copied()
    }

    pub fn min_close(&self) -> Option<f64> {
        self.closes().reduce(f64::min)
    }

    pub fn max_close(&self) -> Option<f64> {
        self.closes().reduce(f64::max)
    }

    /// Average volume of every bar except the newest
    pub fn prior_volume_average(&self) -> Option<f64> {
        let prior = self.volumes.len().checked_sub(1).filter(|n| *n > 0)?;
        let total: u64 = self.volumes.iter().take(prior).sum();
        Some(total as f64 / prior as f64)
    }
}
