//! Configuration of tables.
//!
//! This module provides configuration structures for a [`Table`](crate::Table):
//! - Capacity and rate limiting (`max_size`, `min_size`)
//! - Sampling strategy (uniform or prioritized)
//! - Removal strategy (FIFO)
//! - Serialization and deserialization support
use crate::ReplayError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Default exponent applied to priorities by the prioritized sampler.
pub const DEFAULT_PRIORITY_EXPONENT: f64 = 0.8;

/// Strategy for selecting items to sample.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum SamplerConfig {
    /// Draws items uniformly at random.
    Uniform,

    /// Draws items with probability proportional to `priority^priority_exponent`.
    Prioritized {
        /// Exponent for prioritization. A value of 0 results in uniform sampling.
        priority_exponent: f64,
    },
}

impl SamplerConfig {
    /// Prioritized sampler with [`DEFAULT_PRIORITY_EXPONENT`].
    pub fn prioritized() -> Self {
        Self::Prioritized {
            priority_exponent: DEFAULT_PRIORITY_EXPONENT,
        }
    }

    /// Short name of the sampler, used in stats.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Prioritized { .. } => "prioritized",
        }
    }
}

/// Strategy for selecting items to evict.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum RemoverConfig {
    /// Evicts the earliest inserted item.
    Fifo,
}

/// Configuration of a [`Table`](crate::Table).
///
/// # Examples
///
/// ```rust
/// use replay_core::{SamplerConfig, TableConfig};
///
/// let config = TableConfig::prioritized()
///     .max_size(10_000)
///     .min_size(64)
///     .n_steps(Some(3))
///     .seed(Some(42));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.sampler, SamplerConfig::prioritized());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TableConfig {
    /// Name of the table, used to route requests.
    pub name: String,

    /// Maximum number of items. When exceeded, items are evicted by the remover.
    pub max_size: usize,

    /// Number of items required before sampling is permitted.
    pub min_size: usize,

    /// Sampling strategy.
    pub sampler: SamplerConfig,

    /// Removal strategy.
    pub remover: RemoverConfig,

    /// If set, every item must consist of exactly this many steps.
    pub n_steps: Option<usize>,

    /// Random seed of the sampler. Seeded from entropy if `None`.
    pub seed: Option<u64>,
}

impl Default for TableConfig {
    /// Creates a uniform table holding up to 100 000 items, sampled once
    /// 64 items are stored.
    fn default() -> Self {
        Self {
            name: "uniform_table".to_string(),
            max_size: 100_000,
            min_size: 64,
            sampler: SamplerConfig::Uniform,
            remover: RemoverConfig::Fifo,
            n_steps: None,
            seed: None,
        }
    }
}

impl TableConfig {
    /// Uniform table named `uniform_table`.
    pub fn uniform() -> Self {
        Self::default()
    }

    /// Prioritized table named `priority_table` with the default exponent.
    pub fn prioritized() -> Self {
        Self {
            name: "priority_table".to_string(),
            sampler: SamplerConfig::prioritized(),
            ..Self::default()
        }
    }

    /// Sets the name of the table.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum number of items.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the number of items required before sampling.
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Sets the sampling strategy.
    pub fn sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Sets the removal strategy.
    pub fn remover(mut self, remover: RemoverConfig) -> Self {
        self.remover = remover;
        self
    }

    /// Sets the required number of steps per item.
    pub fn n_steps(mut self, n_steps: Option<usize>) -> Self {
        self.n_steps = n_steps;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Config`] if
    /// - the name is empty,
    /// - `max_size == 0` or `min_size > max_size`,
    /// - `n_steps < 2`,
    /// - the priority exponent is negative or not finite.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.name.is_empty() {
            return Err(ReplayError::Config("table name is empty".into()));
        }
        if self.max_size == 0 {
            return Err(ReplayError::Config(format!(
                "max_size of table {} must be positive",
                self.name
            )));
        }
        if self.min_size > self.max_size {
            return Err(ReplayError::Config(format!(
                "min_size ({}) exceeds max_size ({}) in table {}",
                self.min_size, self.max_size, self.name
            )));
        }
        if let Some(n_steps) = self.n_steps {
            if n_steps < 2 {
                return Err(ReplayError::Config(format!(
                    "n_steps must be at least 2, got {}",
                    n_steps
                )));
            }
        }
        if let SamplerConfig::Prioritized { priority_exponent } = self.sampler {
            if !priority_exponent.is_finite() || priority_exponent < 0.0 {
                return Err(ReplayError::Config(format!(
                    "invalid priority exponent {}",
                    priority_exponent
                )));
            }
        }
        Ok(())
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
