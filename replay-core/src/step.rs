//! Environment steps recorded by producers.
use serde::{Deserialize, Serialize};

/// Observation of an environment.
///
/// Flat observations are stored as [`Observation::Vector`]; environments
/// emitting a feature map together with scalar features use
/// [`Observation::Composite`] of a [`Observation::Tensor`] and further parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    /// A single value.
    Scalar(f32),

    /// A flat vector.
    Vector(Vec<f32>),

    /// A dense tensor in row-major order.
    Tensor {
        /// Shape of the tensor.
        shape: Vec<usize>,

        /// Elements, `shape.iter().product()` of them.
        data: Vec<f32>,
    },

    /// Heterogeneous parts of one observation.
    Composite(Vec<Observation>),
}

impl Observation {
    /// Builds a tensor observation, checking the number of elements.
    pub fn tensor(shape: Vec<usize>, data: Vec<f32>) -> Option<Self> {
        if shape.iter().product::<usize>() == data.len() {
            Some(Self::Tensor { shape, data })
        } else {
            None
        }
    }

    /// Returns the total number of scalar elements.
    pub fn num_elements(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(v) => v.len(),
            Self::Tensor { data, .. } => data.len(),
            Self::Composite(parts) => parts.iter().map(|p| p.num_elements()).sum(),
        }
    }
}

impl From<Vec<f32>> for Observation {
    fn from(v: Vec<f32>) -> Self {
        Self::Vector(v)
    }
}

/// Represents an `(a_t, o_t+1, r_t, done_t+1)` tuple.
///
/// `action` led to `observation`, `reward` was received on the way and `done`
/// tells if the episode ended at `observation`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Action.
    pub action: i32,

    /// Observation.
    pub observation: Observation,

    /// Reward.
    pub reward: f32,

    /// Flag denoting if the episode is done.
    pub done: bool,
}

impl Step {
    /// Action recorded in the first step of an episode.
    pub const SENTINEL_ACTION: i32 = -1;

    /// Constructs a [`Step`] object.
    pub fn new(action: i32, observation: Observation, reward: f32, done: bool) -> Self {
        Self {
            action,
            observation,
            reward,
            done,
        }
    }

    /// The first step of an episode, carrying the observation returned by
    /// `reset()`.
    pub fn initial(observation: Observation) -> Self {
        Self::new(Self::SENTINEL_ACTION, observation, 0.0, false)
    }

    /// Returns `true` if this is the first step of an episode.
    pub fn is_initial(&self) -> bool {
        self.action == Self::SENTINEL_ACTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_step() {
        let step = Step::initial(Observation::Vector(vec![0.5, 1.0]));
        assert!(step.is_initial());
        assert_eq!(step.reward, 0.0);
        assert!(!step.done);
    }

    #[test]
    fn test_tensor_shape_check() {
        assert!(Observation::tensor(vec![2, 3], vec![0.0; 6]).is_some());
        assert!(Observation::tensor(vec![2, 3], vec![0.0; 5]).is_none());

        let obs = Observation::Composite(vec![
            Observation::tensor(vec![2, 2], vec![1.0; 4]).unwrap(),
            Observation::Scalar(3.0),
        ]);
        assert_eq!(obs.num_elements(), 5);
    }
}
