//! Interfaces of the environment and the policy driving data collection.
use crate::Observation;
use anyhow::Result;
use std::collections::HashMap;

/// Outcome of [`Env::step`].
#[derive(Clone, Debug, PartialEq)]
pub struct EnvStep {
    /// Observation after the action.
    pub observation: Observation,

    /// Reward for the action.
    pub reward: f32,

    /// Flag denoting if the episode ended.
    pub done: bool,

    /// Additional information defined by the environment.
    pub info: HashMap<String, String>,
}

/// Environment with discrete actions.
pub trait Env {
    /// Starts a new episode and returns its initial observation.
    fn reset(&mut self) -> Result<Observation>;

    /// Performs an action.
    fn step(&mut self, action: i32) -> Result<EnvStep>;
}

/// Chooses actions during data collection.
pub trait Policy {
    /// Returns the action to take at `observation`.
    fn select_action(&mut self, observation: &Observation) -> i32;
}
