//! Prioritized selection backed by a sum tree.
use super::{sum_tree::SumTree, Selection, Selector};
use rand::{rngs::StdRng, Rng};

/// Upper bound of a slot weight. The sum of `u64::MAX` such weights is still
/// finite.
const MAX_WEIGHT: f64 = 1e280;

/// Draws slot `i` with probability `p_i^e / sum_j p_j^e`, where `e` is the
/// priority exponent fixed at construction.
///
/// Weights are clamped to `[f64::MIN_POSITIVE, 1e280]`, so every registered
/// slot can be drawn and the total stays finite.
///
/// Draws and priority updates are `O(log capacity)`.
#[derive(Debug)]
pub struct PrioritizedSelector {
    priority_exponent: f64,
    sum_tree: SumTree,
    len: usize,
}

impl PrioritizedSelector {
    /// Creates a selector with room for `capacity` slots; more slots are
    /// added on demand.
    pub fn new(capacity: usize, priority_exponent: f64) -> Self {
        Self {
            priority_exponent,
            sum_tree: SumTree::new(capacity),
            len: 0,
        }
    }

    #[inline]
    fn weight(&self, priority: f64) -> f64 {
        let w = priority.powf(self.priority_exponent);
        if w.is_nan() {
            f64::MIN_POSITIVE
        } else {
            w.clamp(f64::MIN_POSITIVE, MAX_WEIGHT)
        }
    }
}

impl Selector for PrioritizedSelector {
    fn insert(&mut self, slot: usize, priority: f64) {
        debug_assert_eq!(self.sum_tree.weight(slot), 0.0);
        self.sum_tree.set(slot, self.weight(priority));
        self.len += 1;
    }

    fn update(&mut self, slot: usize, priority: f64) {
        self.sum_tree.set(slot, self.weight(priority));
    }

    fn remove(&mut self, slot: usize) {
        self.sum_tree.set(slot, 0.0);
        self.len -= 1;
    }

    fn sample(&self, rng: &mut StdRng) -> Option<Selection> {
        let total = self.sum_tree.total();
        if self.len == 0 || total <= 0.0 {
            return None;
        }
        let slot = self.sum_tree.find(rng.gen::<f64>() * total);
        Some(Selection {
            slot,
            probability: self.sum_tree.weight(slot) / total,
        })
    }

    fn len(&self) -> usize {
        self.len
    }
}
