//! Gate coupling producer and consumer progress.
use serde::{Deserialize, Serialize};

/// Permits sampling once the table holds at least `min_size` items, and
/// counts completed inserts and samples over the lifetime of the table.
///
/// A table never serves samples while empty, so a `min_size` of zero behaves
/// like one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimiter {
    min_size: usize,
    completed_inserts: u64,
    completed_samples: u64,
}

impl RateLimiter {
    /// Creates a rate limiter.
    pub fn new(min_size: usize) -> Self {
        Self {
            min_size,
            completed_inserts: 0,
            completed_samples: 0,
        }
    }

    /// Returns `true` if a table of `size` items may be sampled.
    pub fn can_sample(&self, size: usize) -> bool {
        size >= self.min_size.max(1)
    }

    /// Records a completed insert.
    pub fn insert_completed(&mut self) {
        self.completed_inserts += 1;
    }

    /// Records `n` sampled items.
    pub fn samples_completed(&mut self, n: usize) {
        self.completed_samples += n as u64;
    }

    /// Number of items required before sampling.
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Number of inserts completed over the lifetime of the table.
    pub fn completed_inserts(&self) -> u64 {
        self.completed_inserts
    }

    /// Number of items sampled over the lifetime of the table.
    pub fn completed_samples(&self) -> u64 {
        self.completed_samples
    }

    /// Restores the lifetime counters, used by checkpoints.
    pub(crate) fn restore_counters(&mut self, completed_inserts: u64, completed_samples: u64) {
        self.completed_inserts = completed_inserts;
        self.completed_samples = completed_samples;
    }
}
