//! Uniform selection over resident items.
use super::{Selection, Selector};
use rand::{rngs::StdRng, Rng};

/// Draws each resident item with probability `1 / len()`.
///
/// Registered slots are kept densely packed in `slots`; `positions` maps a slot
/// back to its index so that removal is a swap-remove.
#[derive(Debug)]
pub struct UniformSelector {
    slots: Vec<usize>,
    positions: Vec<Option<usize>>,
}

impl UniformSelector {
    /// Creates a selector with room for `capacity` slots; more slots are
    /// added on demand.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            positions: vec![None; capacity],
        }
    }
}

impl Selector for UniformSelector {
    fn insert(&mut self, slot: usize, _priority: f64) {
        if slot >= self.positions.len() {
            self.positions.resize(slot + 1, None);
        }
        debug_assert!(self.positions[slot].is_none());
        self.positions[slot] = Some(self.slots.len());
        self.slots.push(slot);
    }

    fn update(&mut self, _slot: usize, _priority: f64) {}

    fn remove(&mut self, slot: usize) {
        if let Some(pos) = self.positions.get_mut(slot).and_then(Option::take) {
            self.slots.swap_remove(pos);
            if let Some(&moved) = self.slots.get(pos) {
                self.positions[moved] = Some(pos);
            }
        }
    }

    fn sample(&self, rng: &mut StdRng) -> Option<Selection> {
        if self.slots.is_empty() {
            return None;
        }
        let n = self.slots.len();
        Some(Selection {
            slot: self.slots[rng.gen_range(0..n)],
            probability: 1.0 / n as f64,
        })
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_remove_keeps_other_slots() {
        let mut selector = UniformSelector::new(4);
        (0..4).for_each(|slot| selector.insert(slot, 1.0));
        selector.remove(1);
        selector.remove(1);
        assert_eq!(selector.len(), 3);

        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..1000 {
            let selection = selector.sample(&mut rng).unwrap();
            assert_ne!(selection.slot, 1);
            assert_eq!(selection.probability, 1.0 / 3.0);
        }
    }

    #[test]
    fn test_frequency_converges() {
        let mut selector = UniformSelector::new(8);
        (0..5).for_each(|slot| selector.insert(slot, (slot + 1) as f64));

        let mut rng = StdRng::seed_from_u64(42);
        let n_draws = 50_000;
        let mut counts = vec![0usize; 5];
        for _ in 0..n_draws {
            counts[selector.sample(&mut rng).unwrap().slot] += 1;
        }
        for count in counts {
            let freq = count as f64 / n_draws as f64;
            assert!((freq - 0.2).abs() < 0.01, "frequency {}", freq);
        }
    }

    #[test]
    fn test_slots_beyond_capacity() {
        let mut selector = UniformSelector::new(1);
        selector.insert(0, 1.0);
        selector.insert(9, 1.0);
        selector.remove(12);
        assert_eq!(selector.len(), 2);
        selector.remove(0);

        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(selector.sample(&mut rng).unwrap().slot, 9);
    }

    #[test]
    fn test_empty() {
        let selector = UniformSelector::new(2);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(selector.sample(&mut rng).is_none());
    }
}
