//! FIFO eviction.
use crate::Key;
use std::collections::VecDeque;

/// Tracks resident items in insertion order and yields the earliest one for
/// eviction.
#[derive(Debug, Default)]
pub struct FifoRemover {
    /// `(key, slot)` of resident items, earliest first.
    queue: VecDeque<(Key, usize)>,
}

impl FifoRemover {
    /// Creates an empty remover.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
        }
    }

    /// Registers a newly inserted item.
    pub fn insert(&mut self, key: Key, slot: usize) {
        debug_assert!(self.queue.back().map_or(true, |&(k, _)| k < key));
        self.queue.push_back((key, slot));
    }

    /// Removes and returns the earliest inserted item.
    pub fn evict(&mut self) -> Option<(Key, usize)> {
        self.queue.pop_front()
    }

    /// Iterates over resident items, earliest first.
    pub fn iter(&self) -> impl Iterator<Item = &(Key, usize)> {
        self.queue.iter()
    }
}
