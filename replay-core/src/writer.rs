//! Assembly of step streams into sliding-window items.
use crate::{InsertToken, Key, Observation, ReplayError, Step, Table};
use log::trace;
use rand::Rng;
use std::{collections::VecDeque, sync::Arc};

/// An item handed from a [`TrajectoryWriter`] to an [`ItemSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct NewItem {
    /// Name of the destination table.
    pub table: String,

    /// Steps of the item, oldest first.
    pub steps: Vec<Step>,

    /// Initial priority.
    pub priority: f64,

    /// Token making a resend of this item idempotent.
    pub token: Option<InsertToken>,
}

/// Destination of items created by a [`TrajectoryWriter`].
///
/// Implemented by [`Table`] for in-process use and by network clients.
pub trait ItemSink {
    /// Stores the item and returns its key.
    fn insert_item(&mut self, item: NewItem) -> anyhow::Result<Key>;
}

impl<S: ItemSink + ?Sized> ItemSink for &mut S {
    fn insert_item(&mut self, item: NewItem) -> anyhow::Result<Key> {
        (**self).insert_item(item)
    }
}

impl ItemSink for &Table {
    fn insert_item(&mut self, item: NewItem) -> anyhow::Result<Key> {
        if item.table != self.name() {
            return Err(ReplayError::UnknownTable(item.table).into());
        }
        Ok(self.insert_with_token(item.token, item.steps, item.priority)?.key)
    }
}

impl ItemSink for Arc<Table> {
    fn insert_item(&mut self, item: NewItem) -> anyhow::Result<Key> {
        let mut table: &Table = self;
        table.insert_item(item)
    }
}

/// Per-producer ring of the last `n_steps` steps of the current episode.
///
/// Each call to [`create_item`](Self::create_item) once the ring is full
/// forwards the current window to the sink, so consecutive items of an episode
/// overlap in `n_steps - 1` steps. Nothing is sent to the sink before
/// `create_item` is called, so abandoning a writer mid-episode never leaves a
/// partial item behind.
///
/// An episode of `L` environment steps, preceded by the sentinel step of
/// [`begin_episode`](Self::begin_episode), yields `L - n_steps + 2` items
/// when `create_item` is called after every step.
pub struct TrajectoryWriter<S: ItemSink> {
    sink: S,
    table: String,
    n_steps: usize,
    priority: f64,
    ring: VecDeque<Step>,
    /// Steps appended since the start of the episode.
    n_appended: usize,
    writer_id: u64,
    sequence: u64,
}

impl<S: ItemSink> TrajectoryWriter<S> {
    /// Creates a writer of `n_steps`-step items into `table`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Config`] if `n_steps < 2`: an n-step return
    /// needs at least a state and its successor.
    pub fn new(sink: S, table: impl Into<String>, n_steps: usize) -> Result<Self, ReplayError> {
        if n_steps < 2 {
            return Err(ReplayError::Config(format!(
                "n_steps must be at least 2, got {}",
                n_steps
            )));
        }
        Ok(Self {
            sink,
            table: table.into(),
            n_steps,
            priority: 1.0,
            ring: VecDeque::with_capacity(n_steps),
            n_appended: 0,
            writer_id: rand::thread_rng().gen(),
            sequence: 0,
        })
    }

    /// Sets the priority of created items, 1.0 by default.
    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Continues the insert sequence of an earlier writer, given the token
    /// returned by its [`next_token`](Self::next_token).
    pub fn resume(mut self, next: InsertToken) -> Self {
        self.writer_id = next.writer_id;
        self.sequence = next.sequence;
        self
    }

    /// Token of the next created item.
    pub fn next_token(&self) -> InsertToken {
        InsertToken {
            writer_id: self.writer_id,
            sequence: self.sequence,
        }
    }

    /// Number of steps per item.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Steps appended since the start of the episode.
    pub fn n_appended(&self) -> usize {
        self.n_appended
    }

    /// Returns `true` if the next `create_item` will produce an item.
    pub fn is_ready(&self) -> bool {
        self.n_appended >= self.n_steps
    }

    /// Access to the sink, e.g. to query the server between episodes.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the writer and returns the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Drops buffered steps; the next appended step starts a new episode.
    pub fn end_episode(&mut self) {
        self.ring.clear();
        self.n_appended = 0;
    }

    /// Starts an episode with the sentinel step holding the initial observation.
    pub fn begin_episode(&mut self, observation: Observation) {
        self.end_episode();
        self.append(Step::initial(observation));
    }

    /// Appends a step, keeping the last `n_steps` steps.
    pub fn append(&mut self, step: Step) {
        if self.ring.len() == self.n_steps {
            self.ring.pop_front();
        }
        self.ring.push_back(step);
        self.n_appended += 1;
    }

    /// Sends the current window to the sink with the writer's priority.
    ///
    /// Returns `Ok(None)` while fewer than `n_steps` steps were appended in
    /// this episode.
    pub fn create_item(&mut self) -> anyhow::Result<Option<Key>> {
        let priority = self.priority;
        self.create_item_with_priority(priority)
    }

    /// Sends the current window to the sink with the given priority.
    ///
    /// If the sink fails, the window stays buffered and calling this method
    /// again resends it under the same insert token.
    pub fn create_item_with_priority(&mut self, priority: f64) -> anyhow::Result<Option<Key>> {
        if !self.is_ready() {
            return Ok(None);
        }
        let item = NewItem {
            table: self.table.clone(),
            steps: self.ring.iter().cloned().collect(),
            priority,
            token: Some(InsertToken {
                writer_id: self.writer_id,
                sequence: self.sequence,
            }),
        };
        let key = self.sink.insert_item(item)?;
        self.sequence += 1;
        trace!("Created item {} in table {}", key, self.table);
        Ok(Some(key))
    }
}
