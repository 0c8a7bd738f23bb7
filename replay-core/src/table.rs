//! Bounded item table combining a selector, a FIFO remover and a rate limiter.
use crate::{
    item::clamp_priority, selector, FifoRemover, InsertToken, Item, Key, RateLimiter,
    ReplayError, SampleBatch, SampleInfo, SampledItem, Selector, Step, TableCheckpoint,
    TableConfig,
};
use log::{debug, info, trace};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Result of an insert.
#[derive(Clone, Debug, PartialEq)]
pub struct Inserted {
    /// Key assigned to the item.
    pub key: Key,

    /// Key of the item evicted to make room, if any.
    pub evicted: Option<Key>,

    /// `true` if the insert repeated an already applied [`InsertToken`] and
    /// nothing was stored.
    pub duplicate: bool,
}

/// Stats of a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Name of the table.
    pub name: String,

    /// Kind of the sampler, `uniform` or `prioritized`.
    pub sampler: String,

    /// Maximum number of items.
    pub max_size: usize,

    /// Number of items required before sampling.
    pub min_size: usize,

    /// Number of resident items.
    pub current_size: usize,

    /// Number of inserts completed over the lifetime of the table.
    pub inserted_count: u64,

    /// Number of items sampled over the lifetime of the table.
    pub sampled_count: u64,
}

struct Entry {
    key: Key,
    steps: Vec<Step>,
    priority: f64,
    inserted_at: u64,
}

/// Number of slots reserved when a table is created.
const INITIAL_CAPACITY: usize = 1024;

/// Mutable state of a table, guarded by a single mutex so that
/// insert-then-evict and draw-then-copy are atomic.
struct TableState {
    /// Item storage, grown on demand up to `max_size + 1` slots since eviction
    /// follows the insert.
    slots: Vec<Option<Entry>>,
    free_slots: Vec<usize>,
    index: HashMap<Key, usize>,
    selector: Box<dyn Selector>,
    remover: FifoRemover,
    rate_limiter: RateLimiter,
    next_key: Key,
    /// Last applied insert of each writer with a resident item.
    tokens: HashMap<u64, (u64, Key)>,
    /// Writer of each resident item in `tokens`.
    token_owners: HashMap<Key, u64>,
    rng: StdRng,
    closed: bool,
}

impl TableState {
    fn new(config: &TableConfig) -> Self {
        let capacity = config.max_size.saturating_add(1).min(INITIAL_CAPACITY);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            slots: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            index: HashMap::with_capacity(capacity),
            selector: selector::build(&config.sampler, capacity),
            remover: FifoRemover::new(capacity),
            rate_limiter: RateLimiter::new(config.min_size),
            next_key: 0,
            tokens: HashMap::new(),
            token_owners: HashMap::new(),
            rng,
            closed: false,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    /// Stores an entry without touching counters or evicting.
    fn store(&mut self, entry: Entry) {
        let slot = match self.free_slots.last() {
            Some(&slot) => slot,
            None => self.slots.len(),
        };
        self.selector.insert(slot, entry.priority);
        self.remover.insert(entry.key, slot);
        self.index.insert(entry.key, slot);
        if slot == self.slots.len() {
            self.slots.push(Some(entry));
        } else {
            self.free_slots.pop();
            self.slots[slot] = Some(entry);
        }
    }

    /// Records the insert of `token`, replacing the writer's previous one.
    fn record_token(&mut self, token: InsertToken, key: Key) {
        if let Some((_, previous)) = self.tokens.insert(token.writer_id, (token.sequence, key)) {
            self.token_owners.remove(&previous);
        }
        self.token_owners.insert(key, token.writer_id);
    }

    /// Forgets the token of an evicted item.
    fn forget_token(&mut self, key: Key) {
        if let Some(writer_id) = self.token_owners.remove(&key) {
            self.tokens.remove(&writer_id);
        }
    }

    fn insert(&mut self, steps: Vec<Step>, priority: f64, max_size: usize) -> Inserted {
        let key = self.next_key;
        self.next_key += 1;
        self.store(Entry {
            key,
            steps,
            priority,
            inserted_at: self.rate_limiter.completed_inserts(),
        });
        self.rate_limiter.insert_completed();

        let mut evicted = None;
        while self.len() > max_size {
            match self.remover.evict() {
                Some((k, slot)) => {
                    self.selector.remove(slot);
                    self.slots[slot] = None;
                    self.index.remove(&k);
                    self.free_slots.push(slot);
                    self.forget_token(k);
                    trace!("Evicted item {}", k);
                    evicted = Some(k);
                }
                None => break,
            }
        }
        assert!(
            self.len() <= max_size,
            "table holds {} items, exceeding max_size {}",
            self.len(),
            max_size
        );

        Inserted {
            key,
            evicted,
            duplicate: false,
        }
    }

    fn draw(&mut self, batch_size: usize) -> SampleBatch {
        let table_size = self.len();
        let selector = &self.selector;
        let slots = &self.slots;
        let rng = &mut self.rng;
        let items = (0..batch_size)
            .filter_map(|_| {
                let selection = selector.sample(rng)?;
                let entry = slots[selection.slot].as_ref()?;
                Some(SampledItem {
                    steps: entry.steps.clone(),
                    info: SampleInfo {
                        key: entry.key,
                        probability: selection.probability,
                        table_size,
                        priority: entry.priority,
                    },
                })
            })
            .collect::<Vec<_>>();
        self.rate_limiter.samples_completed(items.len());
        SampleBatch { items }
    }
}

fn check_steps(config: &TableConfig, steps: &[Step]) -> Result<(), String> {
    if steps.len() < 2 {
        return Err(format!(
            "an item needs at least 2 steps, got {}",
            steps.len()
        ));
    }
    match config.n_steps {
        Some(n) if n != steps.len() => Err(format!(
            "table {} expects {} steps per item, got {}",
            config.name,
            n,
            steps.len()
        )),
        _ => Ok(()),
    }
}

/// A bounded, thread-safe collection of items.
///
/// * Inserts never block. When the table exceeds `max_size`, the earliest
///   inserted item is evicted within the same critical section.
/// * Samples block until the table holds `min_size` items, then draw
///   `batch_size` items with replacement and copy them out.
/// * Priority updates on keys that are no longer resident are ignored.
pub struct Table {
    config: TableConfig,
    state: Mutex<TableState>,
    sampleable: Condvar,
}

impl Table {
    /// Creates an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Config`] if the configuration is invalid.
    pub fn new(config: TableConfig) -> Result<Self, ReplayError> {
        config.validate()?;
        info!(
            "Created table {} ({}, max_size={}, min_size={})",
            config.name,
            config.sampler.kind(),
            config.max_size,
            config.min_size
        );
        Ok(Self {
            state: Mutex::new(TableState::new(&config)),
            config,
            sampleable: Condvar::new(),
        })
    }

    /// Restores a table from a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Checkpoint`] if the items do not fit the
    /// configuration of the checkpoint, e.g. after `n_steps` was changed.
    pub fn from_checkpoint(checkpoint: TableCheckpoint) -> Result<Self, ReplayError> {
        let TableCheckpoint {
            config,
            next_key,
            completed_inserts,
            completed_samples,
            items,
        } = checkpoint;
        config.validate()?;
        if items.len() > config.max_size {
            return Err(ReplayError::Checkpoint(format!(
                "{} items exceed max_size {} of table {}",
                items.len(),
                config.max_size,
                config.name
            )));
        }

        let mut state = TableState::new(&config);
        let mut last_key = None;
        for item in items {
            if last_key.map_or(false, |k| k >= item.key) || item.key >= next_key {
                return Err(ReplayError::Checkpoint(format!(
                    "item keys of table {} are not in insertion order",
                    config.name
                )));
            }
            last_key = Some(item.key);
            check_steps(&config, &item.steps).map_err(|e| {
                ReplayError::Checkpoint(format!("item {}: {}", item.key, e))
            })?;
            state.store(Entry {
                key: item.key,
                steps: item.steps,
                priority: clamp_priority(item.priority),
                inserted_at: item.inserted_at,
            });
        }
        state.next_key = next_key;
        state
            .rate_limiter
            .restore_counters(completed_inserts, completed_samples);
        info!(
            "Restored table {} with {} items",
            config.name,
            state.len()
        );

        Ok(Self {
            state: Mutex::new(state),
            config,
            sampleable: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_item(&self, steps: &[Step]) -> Result<(), ReplayError> {
        check_steps(&self.config, steps).map_err(ReplayError::InvalidItem)
    }

    fn check_batch_size(batch_size: usize) -> Result<(), ReplayError> {
        if batch_size == 0 {
            Err(ReplayError::InvalidArgument("batch_size must be positive".into()))
        } else {
            Ok(())
        }
    }

    /// Name of the table.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration of the table.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Inserts an item, evicting the earliest one if the table overflows.
    ///
    /// The priority is floored at [`MIN_PRIORITY`](crate::MIN_PRIORITY).
    pub fn insert(&self, steps: Vec<Step>, priority: f64) -> Result<Inserted, ReplayError> {
        self.insert_with_token(None, steps, priority)
    }

    /// Inserts an item unless `token` has already been applied, in which case
    /// the key of the earlier insert is returned.
    ///
    /// The table remembers the last token of each writer while the item it
    /// inserted is resident.
    pub fn insert_with_token(
        &self,
        token: Option<InsertToken>,
        steps: Vec<Step>,
        priority: f64,
    ) -> Result<Inserted, ReplayError> {
        self.check_item(&steps)?;

        let mut state = self.lock();
        if state.closed {
            return Err(ReplayError::Closed(self.config.name.clone()));
        }
        if let Some(token) = token {
            if let Some(&(sequence, key)) = state.tokens.get(&token.writer_id) {
                if sequence == token.sequence {
                    debug!(
                        "Ignored repeated insert {:?} into table {}",
                        token, self.config.name
                    );
                    return Ok(Inserted {
                        key,
                        evicted: None,
                        duplicate: true,
                    });
                }
            }
        }

        let inserted = state.insert(steps, clamp_priority(priority), self.config.max_size);
        if let Some(token) = token {
            state.record_token(token, inserted.key);
        }
        drop(state);

        self.sampleable.notify_all();
        Ok(inserted)
    }

    /// Draws `batch_size` items, blocking until the rate limiter permits
    /// sampling.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Closed`] if the table is closed while waiting.
    pub fn sample(&self, batch_size: usize) -> Result<SampleBatch, ReplayError> {
        Self::check_batch_size(batch_size)?;

        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(ReplayError::Closed(self.config.name.clone()));
            }
            if state.rate_limiter.can_sample(state.len()) {
                return Ok(state.draw(batch_size));
            }
            state = self
                .sampleable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Draws `batch_size` items, waiting at most `timeout` for the rate limiter.
    ///
    /// Returns `Ok(None)` if the table did not reach `min_size` in time.
    pub fn sample_timeout(
        &self,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Option<SampleBatch>, ReplayError> {
        Self::check_batch_size(batch_size)?;

        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(ReplayError::Closed(self.config.name.clone()));
            }
            if state.rate_limiter.can_sample(state.len()) {
                return Ok(Some(state.draw(batch_size)));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .sampleable
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Draws `batch_size` items if the rate limiter permits it, without blocking.
    pub fn try_sample(&self, batch_size: usize) -> Result<Option<SampleBatch>, ReplayError> {
        self.sample_timeout(batch_size, Duration::from_secs(0))
    }

    /// Sets the priorities of resident items.
    ///
    /// Keys that are not resident, e.g. evicted since they were sampled, are
    /// skipped. Returns the number of updated items.
    pub fn update_priorities(&self, keys: &[Key], priorities: &[f64]) -> Result<usize, ReplayError> {
        if keys.len() != priorities.len() {
            return Err(ReplayError::InvalidArgument(format!(
                "{} keys but {} priorities",
                keys.len(),
                priorities.len()
            )));
        }

        let mut state = self.lock();
        let mut n_updated = 0;
        for (key, &priority) in keys.iter().zip(priorities.iter()) {
            let slot = match state.index.get(key) {
                Some(&slot) => slot,
                None => continue,
            };
            let priority = clamp_priority(priority);
            if let Some(entry) = state.slots[slot].as_mut() {
                entry.priority = priority;
            }
            state.selector.update(slot, priority);
            n_updated += 1;
        }
        Ok(n_updated)
    }

    /// Returns the number of resident items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the table holds no item.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of resident items, earliest inserted first.
    pub fn keys(&self) -> Vec<Key> {
        self.lock().remover.iter().map(|&(key, _)| key).collect()
    }

    /// Returns a copy of a resident item.
    pub fn get(&self, key: Key) -> Option<Item> {
        let state = self.lock();
        let slot = *state.index.get(&key)?;
        state.slots[slot].as_ref().map(|entry| Item {
            key: entry.key,
            steps: entry.steps.clone(),
            priority: entry.priority,
            inserted_at: entry.inserted_at,
        })
    }

    /// Returns the stats of the table.
    pub fn info(&self) -> TableInfo {
        let state = self.lock();
        TableInfo {
            name: self.config.name.clone(),
            sampler: self.config.sampler.kind().to_string(),
            max_size: self.config.max_size,
            min_size: self.config.min_size,
            current_size: state.len(),
            inserted_count: state.rate_limiter.completed_inserts(),
            sampled_count: state.rate_limiter.completed_samples(),
        }
    }

    /// Takes a snapshot of the configuration, counters and resident items.
    ///
    /// Insert tokens are not part of the snapshot.
    pub fn checkpoint(&self) -> TableCheckpoint {
        let state = self.lock();
        let items = state
            .remover
            .iter()
            .filter_map(|&(_, slot)| state.slots[slot].as_ref())
            .map(|entry| Item {
                key: entry.key,
                steps: entry.steps.clone(),
                priority: entry.priority,
                inserted_at: entry.inserted_at,
            })
            .collect();
        TableCheckpoint {
            config: self.config.clone(),
            next_key: state.next_key,
            completed_inserts: state.rate_limiter.completed_inserts(),
            completed_samples: state.rate_limiter.completed_samples(),
            items,
        }
    }

    /// Closes the table. Blocked and subsequent samples and inserts fail with
    /// [`ReplayError::Closed`].
    pub fn close(&self) {
        self.lock().closed = true;
        self.sampleable.notify_all();
        debug!("Closed table {}", self.config.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Observation, SamplerConfig};
    use std::{sync::Arc, thread};
    use test_log::test;

    fn steps(tag: f32) -> Vec<Step> {
        vec![
            Step::initial(Observation::Vector(vec![tag, 0.0])),
            Step::new(1, Observation::Vector(vec![tag, 1.0]), tag, false),
        ]
    }

    fn uniform(max_size: usize, min_size: usize) -> Table {
        Table::new(
            TableConfig::uniform()
                .max_size(max_size)
                .min_size(min_size)
                .seed(Some(42)),
        )
        .unwrap()
    }

    #[test]
    fn test_size_never_exceeds_max_size() {
        let table = uniform(5, 1);
        for i in 0..50 {
            table.insert(steps(i as f32), 1.0).unwrap();
            assert!(table.len() <= 5);
        }
        assert_eq!(table.len(), 5);
        assert_eq!(table.info().inserted_count, 50);
    }

    #[test]
    fn test_fifo_eviction() {
        let table = uniform(3, 1);
        let a = table.insert(steps(0.0), 1.0).unwrap();
        let b = table.insert(steps(1.0), 1.0).unwrap();
        let c = table.insert(steps(2.0), 1.0).unwrap();
        assert_eq!(a.evicted, None);
        let d = table.insert(steps(3.0), 1.0).unwrap();
        assert_eq!(d.evicted, Some(a.key));
        assert_eq!(table.keys(), vec![b.key, c.key, d.key]);

        // Stale key
        assert_eq!(table.update_priorities(&[a.key], &[5.0]).unwrap(), 0);
        assert_eq!(table.keys(), vec![b.key, c.key, d.key]);
        assert!(table.get(a.key).is_none());
    }

    #[test]
    fn test_keys_are_unique_and_increasing() {
        let table = uniform(4, 1);
        let keys = (0..10)
            .map(|i| table.insert(steps(i as f32), 1.0).unwrap().key)
            .collect::<Vec<_>>();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_round_trip() {
        let table = uniform(10, 1);
        let content = steps(7.5);
        let inserted = table.insert(content.clone(), 1.0).unwrap();
        let batch = table.sample(1).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.items[0].steps, content);
        assert_eq!(batch.items[0].info.key, inserted.key);
        assert_eq!(batch.items[0].info.table_size, 1);
        assert_eq!(batch.items[0].info.probability, 1.0);
    }

    #[test]
    fn test_uniform_probability_and_stats() {
        let table = uniform(10, 4);
        for i in 0..4 {
            table.insert(steps(i as f32), 1.0).unwrap();
        }
        let batch = table.sample(8).unwrap();
        assert_eq!(batch.len(), 8);
        assert!(batch.probabilities().iter().all(|&p| p == 0.25));
        assert!(batch.table_sizes().iter().all(|&s| s == 4));

        let info = table.info();
        assert_eq!(info.current_size, 4);
        assert_eq!(info.inserted_count, 4);
        assert_eq!(info.sampled_count, 8);
        assert_eq!(info.sampler, "uniform");
    }

    #[test]
    fn test_starved_sample() {
        let table = uniform(10, 3);
        table.insert(steps(0.0), 1.0).unwrap();
        assert!(table.try_sample(2).unwrap().is_none());
        assert!(table
            .sample_timeout(2, Duration::from_millis(20))
            .unwrap()
            .is_none());
        assert_eq!(table.info().sampled_count, 0);
    }

    #[test]
    fn test_sample_blocks_until_min_size() {
        let table = Arc::new(uniform(10, 3));
        let sampler = {
            let table = table.clone();
            thread::spawn(move || table.sample(4))
        };
        for i in 0..3 {
            thread::sleep(Duration::from_millis(10));
            table.insert(steps(i as f32), 1.0).unwrap();
        }
        let batch = sampler.join().unwrap().unwrap();
        assert_eq!(batch.len(), 4);
        assert!(batch.table_sizes().iter().all(|&s| s >= 3));
    }

    #[test]
    fn test_close_wakes_sampler() {
        let table = Arc::new(uniform(10, 3));
        let sampler = {
            let table = table.clone();
            thread::spawn(move || table.sample(1))
        };
        thread::sleep(Duration::from_millis(20));
        table.close();
        assert!(matches!(
            sampler.join().unwrap(),
            Err(ReplayError::Closed(_))
        ));
        assert!(table.insert(steps(0.0), 1.0).is_err());
    }

    #[test]
    fn test_invalid_items() {
        let table = Table::new(TableConfig::uniform().n_steps(Some(3)).min_size(1)).unwrap();
        assert!(matches!(
            table.insert(steps(0.0), 1.0),
            Err(ReplayError::InvalidItem(_))
        ));
        assert!(matches!(
            table.insert(vec![], 1.0),
            Err(ReplayError::InvalidItem(_))
        ));
        assert!(table.sample_timeout(0, Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_invalid_config() {
        let config = TableConfig::uniform().min_size(10).max_size(3);
        assert!(matches!(Table::new(config), Err(ReplayError::Config(_))));
    }

    #[test]
    fn test_priorities_are_floored() {
        let table = Table::new(TableConfig::prioritized().min_size(1).seed(Some(0))).unwrap();
        let a = table.insert(steps(0.0), 0.0).unwrap();
        let b = table.insert(steps(1.0), -3.0).unwrap();
        assert!(table.get(a.key).unwrap().priority > 0.0);
        assert!(table.get(b.key).unwrap().priority > 0.0);

        table.update_priorities(&[a.key], &[f64::NAN]).unwrap();
        assert!(table.get(a.key).unwrap().priority > 0.0);
        assert!(table.sample(4).is_ok());
    }

    #[test]
    fn test_prioritized_frequency() {
        let table = Table::new(
            TableConfig::prioritized()
                .sampler(SamplerConfig::Prioritized {
                    priority_exponent: 1.0,
                })
                .min_size(1)
                .seed(Some(3)),
        )
        .unwrap();
        let keys = [1.0, 1.0, 1.0, 1.0, 100.0]
            .iter()
            .enumerate()
            .map(|(i, &p)| table.insert(steps(i as f32), p).unwrap().key)
            .collect::<Vec<_>>();

        let batch = table.sample(10_000).unwrap();
        let n_fifth = batch.keys().iter().filter(|&&k| k == keys[4]).count();
        assert!(n_fifth > 9_000, "fifth item drawn {} times", n_fifth);
        for item in batch.items.iter().filter(|item| item.info.key == keys[4]) {
            assert!((item.info.probability - 100.0 / 104.0).abs() < 1e-12);
            assert_eq!(item.info.priority, 100.0);
        }
    }

    #[test]
    fn test_prioritized_update_is_reflected() {
        let table = Table::new(
            TableConfig::prioritized()
                .sampler(SamplerConfig::Prioritized {
                    priority_exponent: 1.0,
                })
                .min_size(1)
                .seed(Some(5)),
        )
        .unwrap();
        let keys = (0..4)
            .map(|i| table.insert(steps(i as f32), 1.0).unwrap().key)
            .collect::<Vec<_>>();
        assert_eq!(table.update_priorities(&[keys[0]], &[997.0]).unwrap(), 1);

        let batch = table.sample(5_000).unwrap();
        let n_first = batch.keys().iter().filter(|&&k| k == keys[0]).count();
        assert!(n_first > 4_900);
    }

    #[test]
    fn test_repeated_token_is_ignored() {
        let table = uniform(10, 1);
        let token = InsertToken {
            writer_id: 9,
            sequence: 0,
        };
        let first = table
            .insert_with_token(Some(token), steps(0.0), 1.0)
            .unwrap();
        let again = table
            .insert_with_token(Some(token), steps(0.0), 1.0)
            .unwrap();
        assert!(again.duplicate);
        assert_eq!(first.key, again.key);
        assert_eq!(table.len(), 1);

        let next = InsertToken {
            writer_id: 9,
            sequence: 1,
        };
        let second = table.insert_with_token(Some(next), steps(1.0), 1.0).unwrap();
        assert!(!second.duplicate);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_concurrent_inserts_and_samples() {
        let table = Arc::new(uniform(50, 10));
        let producers = (0..4)
            .map(|p| {
                let table = table.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        table.insert(steps((p * 1000 + i) as f32), 1.0).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        let consumer = {
            let table = table.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let batch = table.sample(16).unwrap();
                    assert!(batch
                        .items
                        .iter()
                        .all(|item| item.info.table_size <= 50 && item.steps.len() == 2));
                }
            })
        };
        producers.into_iter().for_each(|h| h.join().unwrap());
        consumer.join().unwrap();

        let info = table.info();
        assert_eq!(info.current_size, 50);
        assert_eq!(info.inserted_count, 800);
        assert_eq!(info.sampled_count, 50 * 16);
    }

    #[test]
    fn test_huge_priority_keeps_probabilities_finite() {
        let table = Table::new(
            TableConfig::prioritized()
                .sampler(SamplerConfig::Prioritized {
                    priority_exponent: 2.0,
                })
                .min_size(1)
                .seed(Some(5)),
        )
        .unwrap();
        table.insert(steps(0.0), 1.0).unwrap();
        let heavy = table.insert(steps(1.0), 1e200).unwrap();
        assert_eq!(table.len(), 2);

        let batch = table.sample(4).unwrap();
        assert_eq!(batch.len(), 4);
        for item in &batch.items {
            assert_eq!(item.info.key, heavy.key);
            assert!(item.info.probability.is_finite());
            assert!((item.info.probability - 1.0).abs() < 1e-12);
        }

        table.update_priorities(&[heavy.key], &[f64::INFINITY]).unwrap();
        assert!(table.sample(2).unwrap().probabilities().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_storage_grows_with_items() {
        let table = uniform(usize::MAX, 1);
        for i in 0..3 {
            table.insert(steps(i as f32), 1.0).unwrap();
        }
        assert_eq!(table.sample(8).unwrap().len(), 8);
        assert_eq!(table.lock().slots.len(), 3);
    }

    #[test]
    fn test_slots_are_reused_after_eviction() {
        let table = uniform(3, 1);
        for i in 0..20 {
            table.insert(steps(i as f32), 1.0).unwrap();
        }
        assert_eq!(table.len(), 3);
        assert_eq!(table.lock().slots.len(), 4);
        assert_eq!(table.keys(), vec![17, 18, 19]);
    }

    #[test]
    fn test_tokens_of_evicted_items_are_dropped() {
        let table = uniform(2, 1);
        for writer_id in 0..10_000 {
            let token = InsertToken {
                writer_id,
                sequence: 0,
            };
            table.insert_with_token(Some(token), steps(0.0), 1.0).unwrap();
        }
        let state = table.lock();
        assert_eq!(state.tokens.len(), 2);
        assert_eq!(state.token_owners.len(), 2);
    }

    #[test]
    fn test_token_follows_latest_insert_of_writer() {
        let table = uniform(10, 1);
        for sequence in 0..5 {
            let token = InsertToken {
                writer_id: 1,
                sequence,
            };
            table.insert_with_token(Some(token), steps(0.0), 1.0).unwrap();
        }
        let state = table.lock();
        assert_eq!(state.tokens.get(&1), Some(&(4, 4)));
        assert_eq!(state.token_owners.len(), 1);
    }
}
