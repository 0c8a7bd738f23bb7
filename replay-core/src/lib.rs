#![warn(missing_docs)]
//! Item tables and trajectory writers for experience replay.
//!
//! A [`Table`] stores fixed-length windows of [`Step`]s ([`Item`]s), evicts
//! them in FIFO order once `max_size` is exceeded and serves random batches
//! through a [`Selector`] (uniform or prioritized). Sampling is gated by a
//! [`RateLimiter`] until the table holds `min_size` items.
//!
//! Producers feed steps into a [`TrajectoryWriter`], which materializes a
//! sliding n-step window into an item at every step once the window is full.
//! Consumers turn sampled windows into n-step transitions with
//! [`NStepTransition`] and correct for non-uniform sampling with
//! [`IwScheduler`].
pub mod checkpoint;
mod config;
mod env;
mod error;
mod item;
mod iw_scheduler;
mod nstep;
mod rate_limiter;
mod remover;
mod selector;
mod step;
mod table;
mod writer;

pub use checkpoint::TableCheckpoint;
pub use config::{RemoverConfig, SamplerConfig, TableConfig, DEFAULT_PRIORITY_EXPONENT};
pub use env::{Env, EnvStep, Policy};
pub use error::ReplayError;
pub use item::{InsertToken, Item, Key, SampleBatch, SampleInfo, SampledItem, MIN_PRIORITY};
pub use iw_scheduler::{importance_weights, IwScheduler, IwSchedulerConfig, WeightNormalizer};
pub use nstep::{NStepBatch, NStepTransition};
pub use rate_limiter::RateLimiter;
pub use remover::FifoRemover;
pub use selector::{PrioritizedSelector, Selection, Selector, UniformSelector};
pub use step::{Observation, Step};
pub use table::{Inserted, Table, TableInfo};
pub use writer::{ItemSink, NewItem, TrajectoryWriter};
