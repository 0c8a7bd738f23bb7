//! Sum tree for prioritized sampling.
//!
//! Leaves hold the weights of the slots and each internal node holds the sum
//! of its children. Nodes are recomputed from their children on every update,
//! so removed slots leave exact zeros behind.

#[derive(Debug)]
pub struct SumTree {
    /// Number of leaves, a power of two.
    n_leaves: usize,

    /// 1-indexed heap; `tree[1]` is the root and leaves start at `n_leaves`.
    tree: Vec<f64>,
}

impl SumTree {
    pub fn new(capacity: usize) -> Self {
        let n_leaves = capacity.max(1).next_power_of_two();
        Self {
            n_leaves,
            tree: vec![0f64; 2 * n_leaves],
        }
    }

    pub fn total(&self) -> f64 {
        self.tree[1]
    }

    pub fn weight(&self, ix: usize) -> f64 {
        if ix < self.n_leaves {
            self.tree[ix + self.n_leaves]
        } else {
            0.0
        }
    }

    /// Grows the leaves to the next power of two holding `ix`, keeping the weights.
    fn grow(&mut self, ix: usize) {
        let n_leaves = (ix + 1).next_power_of_two();
        let mut tree = vec![0f64; 2 * n_leaves];
        tree[n_leaves..n_leaves + self.n_leaves].copy_from_slice(&self.tree[self.n_leaves..]);
        for node in (1..n_leaves).rev() {
            tree[node] = tree[2 * node] + tree[2 * node + 1];
        }
        self.n_leaves = n_leaves;
        self.tree = tree;
    }

    /// Sets the weight of the `ix`-th leaf and updates partial sums up to the root.
    ///
    /// The tree grows if `ix` exceeds the current number of leaves.
    pub fn set(&mut self, ix: usize, w: f64) {
        debug_assert!(w >= 0.0 && w.is_finite(), "invalid weight {}", w);
        if ix >= self.n_leaves {
            self.grow(ix);
        }

        let mut node = ix + self.n_leaves;
        self.tree[node] = w;
        while node > 1 {
            node /= 2;
            self.tree[node] = self.tree[2 * node] + self.tree[2 * node + 1];
        }
    }

    /// Returns the leaf whose cumulative weight interval contains `s`.
    ///
    /// `s` is expected in `[0, total())`. Subtrees with zero weight are never
    /// entered, so the result has a positive weight whenever `total() > 0`.
    pub fn find(&self, mut s: f64) -> usize {
        let mut node = 1;
        while node < self.n_leaves {
            let left = 2 * node;
            let right = left + 1;
            let go_left = self.tree[right] <= 0.0 || (s < self.tree[left] && self.tree[left] > 0.0);
            if go_left {
                node = left;
            } else {
                s = (s - self.tree[left]).max(0.0);
                node = right;
            }
        }
        node - self.n_leaves
    }
}
