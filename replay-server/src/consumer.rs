//! Training-side handle sampling n-step transitions.
use crate::{Client, ReplayServerError};
use anyhow::Result;
use log::trace;
use replay_core::{
    importance_weights, IwScheduler, IwSchedulerConfig, Key, NStepBatch, SampleBatch,
    WeightNormalizer,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
    time::Duration,
};

/// Configuration of [`Consumer`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ConsumerConfig {
    /// Name of the sampled table.
    pub table: String,

    /// Number of items per batch.
    pub batch_size: usize,

    /// Discount factor of n-step returns.
    pub discount: f32,

    /// Schedule of the exponent of importance weights.
    pub iw: IwSchedulerConfig,

    /// Normalization of importance weights.
    pub normalizer: WeightNormalizer,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            table: "priority_table".to_string(),
            batch_size: 32,
            discount: 0.95,
            iw: IwSchedulerConfig::default(),
            normalizer: WeightNormalizer::Batch,
        }
    }
}

impl ConsumerConfig {
    /// Sets the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the discount factor.
    pub fn discount(mut self, discount: f32) -> Self {
        self.discount = discount;
        self
    }

    /// Sets the importance weight schedule.
    pub fn iw(mut self, iw: IwSchedulerConfig) -> Self {
        self.iw = iw;
        self
    }

    /// Sets the normalization of importance weights.
    pub fn normalizer(mut self, normalizer: WeightNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ReplayServerError::Config("batch_size must be positive".into()).into());
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(ReplayServerError::Config(format!(
                "discount must be in [0, 1], got {}",
                self.discount
            ))
            .into());
        }
        Ok(())
    }

    /// Constructs [`ConsumerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ConsumerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Batch of n-step transitions with importance weights.
#[derive(Clone, Debug)]
pub struct TrainingBatch {
    /// Transitions.
    pub transitions: NStepBatch,

    /// Importance weights.
    pub weights: Vec<f32>,

    /// Exponent used for the weights.
    pub beta: f32,
}

impl TrainingBatch {
    /// Keys of the sampled items.
    pub fn keys(&self) -> &[Key] {
        &self.transitions.keys
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Returns `true` if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Samples batches from a table and feeds back priorities.
pub struct Consumer {
    config: ConsumerConfig,
    client: Client,
    iw_scheduler: IwScheduler,
    items_sampled: u64,
}

impl Consumer {
    /// Creates a consumer over a connected client.
    pub fn new(config: ConsumerConfig, client: Client) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            iw_scheduler: IwScheduler::new(config.iw.clone()),
            config,
            client,
            items_sampled: 0,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Samples a batch, blocking until the table reaches its minimum size.
    pub fn next_batch(&mut self) -> Result<TrainingBatch> {
        let batch = self
            .client
            .sample(&self.config.table, self.config.batch_size)?;
        self.assemble(batch)
    }

    /// Samples a batch, waiting at most `timeout`.
    pub fn try_next_batch(&mut self, timeout: Duration) -> Result<Option<TrainingBatch>> {
        match self
            .client
            .sample_timeout(&self.config.table, self.config.batch_size, timeout)?
        {
            Some(batch) => Ok(Some(self.assemble(batch)?)),
            None => Ok(None),
        }
    }

    fn assemble(&mut self, batch: SampleBatch) -> Result<TrainingBatch> {
        let transitions = NStepBatch::from_sample(&batch, self.config.discount)?;
        let beta = self.iw_scheduler.beta();
        let weights = importance_weights(
            &transitions.probabilities,
            &transitions.table_sizes,
            beta,
            self.config.normalizer,
        );
        self.iw_scheduler.step();
        self.items_sampled += transitions.len() as u64;
        trace!(
            "Sampled {} transitions from {} (beta = {})",
            transitions.len(),
            self.config.table,
            beta
        );
        Ok(TrainingBatch {
            transitions,
            weights,
            beta,
        })
    }

    /// Sends new priorities of sampled items, e.g. absolute TD errors.
    pub fn update_priorities(&mut self, keys: &[Key], priorities: &[f64]) -> Result<usize> {
        self.client
            .update_priorities(&self.config.table, keys, priorities)
    }

    /// Returns `true` if the table has completed fewer inserts than the
    /// number of items this consumer has sampled.
    pub fn needs_more_data(&mut self) -> Result<bool> {
        let info = self.client.server_info(&self.config.table)?;
        Ok(info.inserted_count < self.items_sampled)
    }

    /// Lifetime number of sampled items.
    pub fn items_sampled(&self) -> u64 {
        self.items_sampled
    }

    /// Current exponent of importance weights.
    pub fn beta(&self) -> f32 {
        self.iw_scheduler.beta()
    }

    /// Access to the underlying client.
    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}
