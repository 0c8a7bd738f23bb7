//! Items stored in a table and the batches sampled from it.
use crate::Step;
use serde::{Deserialize, Serialize};

/// Unique, monotonically increasing identifier of an item in a table.
pub type Key = u64;

/// Lower bound of item priorities.
pub const MIN_PRIORITY: f64 = 1e-8;

/// Clamps a priority to `[MIN_PRIORITY, f64::MAX]`. `NaN` is mapped to the
/// floor.
#[inline]
pub(crate) fn clamp_priority(priority: f64) -> f64 {
    if priority.is_nan() {
        MIN_PRIORITY
    } else {
        priority.clamp(MIN_PRIORITY, f64::MAX)
    }
}

/// A window of consecutive steps stored in a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Key of the item.
    pub key: Key,

    /// Steps, oldest first.
    pub steps: Vec<Step>,

    /// Priority, always `>= MIN_PRIORITY`.
    pub priority: f64,

    /// Position in the insertion order of the table.
    pub inserted_at: u64,
}

/// Identifies one insert request of a writer, making retries of the request
/// idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsertToken {
    /// Random id of the writer.
    pub writer_id: u64,

    /// Sequence number of the insert within the writer.
    pub sequence: u64,
}

/// Information attached to a sampled item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Key of the item.
    pub key: Key,

    /// Probability with which the item was selected.
    pub probability: f64,

    /// Number of items in the table at draw time.
    pub table_size: usize,

    /// Priority of the item at draw time.
    pub priority: f64,
}

/// An item copied out of a table by a sample operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampledItem {
    /// Steps of the item.
    pub steps: Vec<Step>,

    /// Sampling information.
    pub info: SampleInfo,
}

/// A batch of items drawn atomically from one table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    /// Sampled items, in draw order.
    pub items: Vec<SampledItem>,
}

impl SampleBatch {
    /// Returns the number of items in the batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the batch has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys of the sampled items.
    pub fn keys(&self) -> Vec<Key> {
        self.items.iter().map(|item| item.info.key).collect()
    }

    /// Selection probabilities of the sampled items.
    pub fn probabilities(&self) -> Vec<f64> {
        self.items.iter().map(|item| item.info.probability).collect()
    }

    /// Table sizes at draw time.
    pub fn table_sizes(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.info.table_size).collect()
    }
}
