//! n-step transitions assembled from sampled windows.
use crate::{Key, Observation, ReplayError, SampleBatch, Step};

/// An n-step transition `(o_0, a_1, R, o_{N-1}, done_{N-1})` taken from a
/// window of `N` steps.
///
/// The first step of a window holds the observation the transition starts
/// from; its action and reward belong to the previous transition (or are the
/// sentinel values at the start of an episode) and are ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct NStepTransition {
    /// Action taken at the first observation, recorded in step 1.
    pub action: i32,

    /// Observation of step 0.
    pub first_observation: Observation,

    /// Observation of step `N - 1`.
    pub last_observation: Observation,

    /// `R = sum_{t=1}^{N-1} gamma^{t-1} r_t`.
    pub discounted_return: f32,

    /// Done flag of step `N - 1`.
    pub done: bool,

    /// `gamma^{N-1}`, the discount applied to the bootstrapped value of the
    /// last observation.
    pub bootstrap_discount: f32,
}

impl NStepTransition {
    /// Builds a transition from a window of steps.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidItem`] if the window has fewer than two steps.
    pub fn from_steps(steps: &[Step], gamma: f32) -> Result<Self, ReplayError> {
        if steps.len() < 2 {
            return Err(ReplayError::InvalidItem(format!(
                "an n-step window needs at least 2 steps, got {}",
                steps.len()
            )));
        }
        let first = &steps[0];
        let last = &steps[steps.len() - 1];

        let mut discounted_return = 0f32;
        let mut discount = 1f32;
        for step in &steps[1..] {
            discounted_return += discount * step.reward;
            discount *= gamma;
        }

        Ok(Self {
            action: steps[1].action,
            first_observation: first.observation.clone(),
            last_observation: last.observation.clone(),
            discounted_return,
            done: last.done,
            bootstrap_discount: discount,
        })
    }
}

/// Columnar batch of n-step transitions with the sampling information of each
/// transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NStepBatch {
    /// Actions.
    pub actions: Vec<i32>,

    /// First observations.
    pub first_observations: Vec<Observation>,

    /// Last observations.
    pub last_observations: Vec<Observation>,

    /// Discounted returns.
    pub returns: Vec<f32>,

    /// Done flags of the last steps.
    pub dones: Vec<bool>,

    /// Bootstrap discounts.
    pub bootstrap_discounts: Vec<f32>,

    /// Keys of the sampled items, for priority updates.
    pub keys: Vec<Key>,

    /// Selection probabilities.
    pub probabilities: Vec<f64>,

    /// Table sizes at draw time.
    pub table_sizes: Vec<usize>,
}

impl NStepBatch {
    /// Assembles the transitions of all items in a sampled batch.
    pub fn from_sample(batch: &SampleBatch, gamma: f32) -> Result<Self, ReplayError> {
        let mut out = Self::with_capacity(batch.len());
        for item in &batch.items {
            out.push(NStepTransition::from_steps(&item.steps, gamma)?);
            out.keys.push(item.info.key);
            out.probabilities.push(item.info.probability);
            out.table_sizes.push(item.info.table_size);
        }
        Ok(out)
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            actions: Vec::with_capacity(capacity),
            first_observations: Vec::with_capacity(capacity),
            last_observations: Vec::with_capacity(capacity),
            returns: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            bootstrap_discounts: Vec::with_capacity(capacity),
            keys: Vec::with_capacity(capacity),
            probabilities: Vec::with_capacity(capacity),
            table_sizes: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, tr: NStepTransition) {
        self.actions.push(tr.action);
        self.first_observations.push(tr.first_observation);
        self.last_observations.push(tr.last_observation);
        self.returns.push(tr.discounted_return);
        self.dones.push(tr.done);
        self.bootstrap_discounts.push(tr.bootstrap_discount);
    }

    /// Returns the number of transitions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SampleInfo, SampledItem};

    fn window(rewards: &[f32]) -> Vec<Step> {
        rewards
            .iter()
            .enumerate()
            .map(|(t, &r)| {
                let done = t == rewards.len() - 1;
                Step::new(t as i32 * 10, Observation::Scalar(t as f32), r, done)
            })
            .collect()
    }

    #[test]
    fn test_three_steps() {
        let (r1, r2, gamma) = (0.7f32, -1.3f32, 0.95f32);
        let tr = NStepTransition::from_steps(&window(&[0.0, r1, r2]), gamma).unwrap();
        assert_eq!(tr.discounted_return, r1 + gamma * r2);
        assert_eq!(tr.bootstrap_discount, gamma * gamma);
        assert_eq!(tr.action, 10);
        assert_eq!(tr.first_observation, Observation::Scalar(0.0));
        assert_eq!(tr.last_observation, Observation::Scalar(2.0));
        assert!(tr.done);
    }

    #[test]
    fn test_two_steps() {
        let gamma = 0.95f32;
        let tr = NStepTransition::from_steps(&window(&[0.0, 1.5]), gamma).unwrap();
        assert_eq!(tr.discounted_return, 1.5);
        assert_eq!(tr.bootstrap_discount, gamma);
    }

    #[test]
    fn test_first_reward_is_ignored() {
        let tr = NStepTransition::from_steps(&window(&[100.0, 1.0, 1.0, 1.0]), 0.5).unwrap();
        assert_eq!(tr.discounted_return, 1.75);
        assert_eq!(tr.bootstrap_discount, 0.125);
    }

    #[test]
    fn test_too_short() {
        assert!(NStepTransition::from_steps(&window(&[1.0]), 0.9).is_err());
    }

    #[test]
    fn test_batch() {
        let items = (0..3)
            .map(|i| SampledItem {
                steps: window(&[0.0, i as f32]),
                info: SampleInfo {
                    key: i,
                    probability: 0.5,
                    table_size: 2,
                    priority: 1.0,
                },
            })
            .collect();
        let batch = NStepBatch::from_sample(&SampleBatch { items }, 0.9).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.returns, vec![0.0, 1.0, 2.0]);
        assert_eq!(batch.keys, vec![0, 1, 2]);
        assert_eq!(batch.table_sizes, vec![2, 2, 2]);
    }
}
