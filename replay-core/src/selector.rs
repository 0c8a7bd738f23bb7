//! Strategies for selecting items to sample.
//!
//! A selector tracks the slots of resident items and draws one slot at a time.
//! Slots are indices into the storage of a [`Table`](crate::Table); the table
//! reuses the slot of an evicted item for the next insert and only opens a new
//! slot when none is free. Selectors keep per-slot state in arrays that grow
//! with the highest slot seen.
mod prioritized;
mod sum_tree;
mod uniform;
use crate::SamplerConfig;
pub use prioritized::PrioritizedSelector;
use rand::rngs::StdRng;
pub use uniform::UniformSelector;

/// Result of a single draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    /// Slot of the selected item.
    pub slot: usize,

    /// Probability with which the slot was selected.
    pub probability: f64,
}

/// Interface of sampling strategies.
pub trait Selector: Send {
    /// Registers an item at `slot` with the given priority.
    fn insert(&mut self, slot: usize, priority: f64);

    /// Changes the priority of the item at `slot`.
    fn update(&mut self, slot: usize, priority: f64);

    /// Unregisters the item at `slot`.
    fn remove(&mut self, slot: usize);

    /// Draws one slot, or `None` if no item is registered.
    fn sample(&self, rng: &mut StdRng) -> Option<Selection>;

    /// Returns the number of registered items.
    fn len(&self) -> usize;
}

/// Builds a selector with room for `capacity` slots.
pub(crate) fn build(config: &SamplerConfig, capacity: usize) -> Box<dyn Selector> {
    match config {
        SamplerConfig::Uniform => Box::new(UniformSelector::new(capacity)),
        SamplerConfig::Prioritized { priority_exponent } => {
            Box::new(PrioritizedSelector::new(capacity, *priority_exponent))
        }
    }
}
