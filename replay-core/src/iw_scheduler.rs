//! Scheduling the exponent of importance weights for prioritized sampling.
use serde::{Deserialize, Serialize};

/// Configuration of [`IwScheduler`].
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwSchedulerConfig {
    /// Initial value of $\beta$.
    pub beta_0: f32,

    /// Increment of $\beta$ per sample call.
    pub increment: f32,

    /// Final value of $\beta$.
    pub beta_final: f32,
}

impl Default for IwSchedulerConfig {
    fn default() -> Self {
        Self {
            beta_0: 0.4,
            increment: 0.0001,
            beta_final: 1.0,
        }
    }
}

/// Scheduler of the exponent of importance weights.
///
/// $\beta$ starts at `beta_0`, grows by `increment` per sample call and is
/// clamped at `beta_final`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwScheduler {
    config: IwSchedulerConfig,

    /// Sample calls so far.
    n_samples: u64,
}

impl IwScheduler {
    /// Creates a scheduler.
    pub fn new(config: IwSchedulerConfig) -> Self {
        Self {
            config,
            n_samples: 0,
        }
    }

    /// Gets the exponent of importance weights.
    pub fn beta(&self) -> f32 {
        let beta = self.config.beta_0 + self.config.increment * self.n_samples as f32;
        beta.min(self.config.beta_final)
    }

    /// Advances the schedule by one sample call.
    pub fn step(&mut self) {
        self.n_samples += 1;
    }

    /// Sample calls so far.
    pub fn n_samples(&self) -> u64 {
        self.n_samples
    }
}

/// Normalization of importance weights.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub enum WeightNormalizer {
    /// Divides the weights by their maximum within the batch.
    Batch,

    /// Leaves the weights as they are.
    Off,
}

/// Computes importance weights $w_i=\left(N_i P(i)\right)^{-\beta}$, where
/// $N_i$ is the table size when item $i$ was drawn.
pub fn importance_weights(
    probabilities: &[f64],
    table_sizes: &[usize],
    beta: f32,
    normalizer: WeightNormalizer,
) -> Vec<f32> {
    let ws = probabilities
        .iter()
        .zip(table_sizes.iter())
        .map(|(&p, &n)| (n as f64 * p).powf(-(beta as f64)) as f32)
        .collect::<Vec<_>>();

    match normalizer {
        WeightNormalizer::Off => ws,
        WeightNormalizer::Batch => {
            let w_max = ws.iter().cloned().fold(f32::MIN, f32::max);
            if w_max > 0.0 && w_max.is_finite() {
                ws.iter().map(|w| w / w_max).collect()
            } else {
                ws
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_schedule() {
        let mut scheduler = IwScheduler::new(IwSchedulerConfig::default());
        assert_eq!(scheduler.beta(), 0.4);
        for _ in 0..1000 {
            scheduler.step();
        }
        assert!((scheduler.beta() - 0.5).abs() < 1e-5);
        for _ in 0..10_000 {
            scheduler.step();
        }
        assert_eq!(scheduler.beta(), 1.0);
        scheduler.step();
        assert_eq!(scheduler.beta(), 1.0);
    }

    #[test]
    fn test_uniform_weights_are_one() {
        let ws = importance_weights(&[0.25; 4], &[4; 4], 0.7, WeightNormalizer::Off);
        assert!(ws.iter().all(|&w| (w - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_batch_normalization() {
        let ws = importance_weights(&[0.5, 0.125], &[4, 4], 1.0, WeightNormalizer::Batch);
        assert!((ws[0] - 0.25).abs() < 1e-6);
        assert!((ws[1] - 1.0).abs() < 1e-6);
    }
}
