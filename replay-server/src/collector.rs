//! Producer loop feeding episodes of an environment into a table.
use crate::{Client, ReplayServerError};
use anyhow::Result;
use log::{debug, info};
use replay_core::{Env, InsertToken, ItemSink, Policy, Step, TrajectoryWriter};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Collector`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CollectorConfig {
    /// Name of the table receiving items.
    pub table: String,

    /// Number of steps in an item.
    pub n_steps: usize,

    /// Priority of inserted items.
    pub priority: f64,

    /// Episodes are cut after this number of environment steps.
    pub max_episode_steps: Option<usize>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            table: "priority_table".to_string(),
            n_steps: 2,
            priority: 1.0,
            max_episode_steps: None,
        }
    }
}

impl CollectorConfig {
    /// Sets the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the number of steps in an item.
    pub fn n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    /// Sets the priority of inserted items.
    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the maximum length of episodes.
    pub fn max_episode_steps(mut self, v: Option<usize>) -> Self {
        self.max_episode_steps = v;
        self
    }

    /// Constructs [`CollectorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CollectorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Stats of a collected episode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EpisodeStats {
    /// Environment steps.
    pub steps: usize,

    /// Items created.
    pub items: usize,

    /// Sum of rewards.
    pub total_reward: f32,
}

/// Runs a policy in an environment and writes the resulting steps as items.
pub struct Collector<E, P> {
    config: CollectorConfig,
    env: E,
    policy: P,
    n_episodes: usize,
    /// Insert sequence carried across calls of `collect_until_inserted`.
    next_token: Option<InsertToken>,
}

impl<E: Env, P: Policy> Collector<E, P> {
    /// Creates a collector.
    pub fn new(config: CollectorConfig, env: E, policy: P) -> Self {
        Self {
            config,
            env,
            policy,
            n_episodes: 0,
            next_token: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Number of collected episodes.
    pub fn n_episodes(&self) -> usize {
        self.n_episodes
    }

    /// Creates a writer over `sink` as configured.
    ///
    /// After [`collect_until_inserted`](Self::collect_until_inserted) the
    /// writer continues the insert sequence used there.
    pub fn writer<S: ItemSink>(&self, sink: S) -> Result<TrajectoryWriter<S>> {
        let writer = TrajectoryWriter::new(sink, self.config.table.as_str(), self.config.n_steps)?
            .priority(self.config.priority);
        Ok(match self.next_token {
            Some(token) => writer.resume(token),
            None => writer,
        })
    }

    /// Runs one episode, creating an item after every step once the window
    /// is full.
    pub fn collect_episode<S: ItemSink>(
        &mut self,
        writer: &mut TrajectoryWriter<S>,
    ) -> Result<EpisodeStats> {
        let mut stats = EpisodeStats::default();
        let mut obs = self.env.reset()?;
        writer.begin_episode(obs.clone());

        loop {
            let action = self.policy.select_action(&obs);
            let step = self.env.step(action)?;
            stats.steps += 1;
            stats.total_reward += step.reward;
            let done = step.done;
            obs = step.observation.clone();
            writer.append(Step::new(action, step.observation, step.reward, done));

            if writer.create_item()?.is_some() {
                stats.items += 1;
            }

            let truncated = self
                .config
                .max_episode_steps
                .map_or(false, |max| stats.steps >= max);
            if done || truncated {
                break;
            }
        }

        writer.end_episode();
        self.n_episodes += 1;
        debug!(
            "Episode {}: steps = {}, items = {}, return = {}",
            self.n_episodes, stats.steps, stats.items, stats.total_reward
        );
        Ok(stats)
    }

    /// Runs `n` episodes.
    pub fn collect_episodes<S: ItemSink>(
        &mut self,
        writer: &mut TrajectoryWriter<S>,
        n: usize,
    ) -> Result<Vec<EpisodeStats>> {
        (0..n).map(|_| self.collect_episode(writer)).collect()
    }

    /// Runs episodes until the table reports at least `n` completed inserts.
    /// Returns the number of completed inserts.
    ///
    /// Fails if an episode ends without creating an item, since the loop
    /// would make no progress.
    ///
    /// All calls write under the same writer identity.
    pub fn collect_until_inserted(&mut self, client: &mut Client, n: u64) -> Result<u64> {
        let mut writer = self.writer(client)?;
        let result = self.fill(&mut writer, n);
        self.next_token = Some(writer.next_token());
        result
    }

    fn fill(&mut self, writer: &mut TrajectoryWriter<&mut Client>, n: u64) -> Result<u64> {
        let table = self.config.table.clone();
        loop {
            let inserted = writer.sink_mut().server_info(&table)?.inserted_count;
            if inserted >= n {
                info!("Table {} reached {} inserts", table, inserted);
                return Ok(inserted);
            }
            if self.collect_episode(writer)?.items == 0 {
                return Err(ReplayServerError::Config(format!(
                    "episodes shorter than n_steps - 1 = {} create no items",
                    self.config.n_steps - 1
                ))
                .into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::{EnvStep, Observation, Table, TableConfig};
    use std::collections::HashMap;

    /// Counts up from zero and ends the episode at `len`.
    struct Counter {
        t: usize,
        len: usize,
    }

    impl Env for Counter {
        fn reset(&mut self) -> Result<Observation> {
            self.t = 0;
            Ok(Observation::Scalar(0.0))
        }

        fn step(&mut self, _action: i32) -> Result<EnvStep> {
            self.t += 1;
            Ok(EnvStep {
                observation: Observation::Scalar(self.t as f32),
                reward: 1.0,
                done: self.t >= self.len,
                info: HashMap::new(),
            })
        }
    }

    struct Constant(i32);

    impl Policy for Constant {
        fn select_action(&mut self, _observation: &Observation) -> i32 {
            self.0
        }
    }

    #[test]
    fn test_collect_episode() -> Result<()> {
        let table = Table::new(TableConfig::default().name("t").n_steps(Some(3)))?;
        let config = CollectorConfig::default().table("t").n_steps(3);
        let mut collector = Collector::new(config, Counter { t: 0, len: 5 }, Constant(2));
        let mut writer = collector.writer(&table)?;

        let stats = collector.collect_episode(&mut writer)?;
        assert_eq!(stats.steps, 5);
        // 6 steps including the sentinel give 6 - 3 + 1 windows.
        assert_eq!(stats.items, 4);
        assert_eq!(stats.total_reward, 5.0);
        assert_eq!(table.len(), 4);

        let first = table.get(table.keys()[0]).unwrap();
        assert!(first.steps[0].is_initial());
        assert_eq!(first.steps[1].action, 2);
        assert_eq!(first.steps[2].observation, Observation::Scalar(2.0));
        Ok(())
    }

    #[test]
    fn test_max_episode_steps() -> Result<()> {
        let table = Table::new(TableConfig::default().name("t"))?;
        let config = CollectorConfig::default()
            .table("t")
            .max_episode_steps(Some(3));
        let mut collector = Collector::new(config, Counter { t: 0, len: 100 }, Constant(0));
        let mut writer = collector.writer(&table)?;

        let stats = collector.collect_episodes(&mut writer, 2)?;
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.steps == 3 && s.items == 3));
        assert_eq!(collector.n_episodes(), 2);
        assert_eq!(table.len(), 6);
        Ok(())
    }

    #[test]
    fn test_writer_identity_is_kept_across_calls() -> Result<()> {
        let server = crate::Server::start(
            crate::ServerConfig::default().table(TableConfig::prioritized().min_size(1)),
        )?;
        let mut client = Client::connect(server.local_addr())?;
        let mut collector = Collector::new(
            CollectorConfig::default(),
            Counter { t: 0, len: 4 },
            Constant(1),
        );

        assert_eq!(collector.collect_until_inserted(&mut client, 4)?, 4);
        let first = collector.next_token.unwrap();
        assert_eq!(first.sequence, 4);

        assert_eq!(collector.collect_until_inserted(&mut client, 6)?, 8);
        let second = collector.next_token.unwrap();
        assert_eq!(second.writer_id, first.writer_id);
        assert_eq!(second.sequence, 8);
        assert_eq!(collector.writer(&mut client)?.next_token(), second);
        Ok(())
    }
}
