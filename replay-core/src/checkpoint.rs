//! Snapshots of tables.
//!
//! A [`TableCheckpoint`] holds everything needed to rebuild a table after a
//! restart: its configuration, lifetime counters, the next key to assign and
//! the resident items in insertion order. Checkpoints are stored with
//! `bincode`.
use crate::{Item, Key, ReplayError, TableConfig};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Snapshot of a [`Table`](crate::Table).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableCheckpoint {
    /// Configuration of the table.
    pub config: TableConfig,

    /// Key assigned to the next inserted item.
    pub next_key: Key,

    /// Lifetime number of completed inserts.
    pub completed_inserts: u64,

    /// Lifetime number of sampled items.
    pub completed_samples: u64,

    /// Resident items, earliest inserted first.
    pub items: Vec<Item>,
}

impl TableCheckpoint {
    /// Writes the checkpoint to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|e| ReplayError::Checkpoint(e.to_string()))
    }

    /// Reads a checkpoint from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let file = File::open(path)?;
        bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| ReplayError::Checkpoint(e.to_string()))
    }
}
