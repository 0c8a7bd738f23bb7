//! Configuration of [`Server`](crate::Server).
use crate::ReplayServerError;
use anyhow::Result;
use replay_core::TableConfig;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Configuration of [`Server`](crate::Server).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Address to bind.
    pub address: String,

    /// Port to bind. A free port is picked if `None`.
    pub port: Option<u16>,

    /// Tables served by the server.
    pub tables: Vec<TableConfig>,

    /// Directory where table checkpoints are written.
    pub checkpoint_dir: Option<PathBuf>,

    /// If `true`, tables with a checkpoint in `checkpoint_dir` are restored
    /// from it at start-up.
    pub restore_from_checkpoint: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: None,
            tables: vec![],
            checkpoint_dir: None,
            restore_from_checkpoint: false,
        }
    }
}

impl ServerConfig {
    /// Sets the address to bind.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets the port to bind.
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Sets the tables.
    pub fn tables(mut self, tables: Vec<TableConfig>) -> Self {
        self.tables = tables;
        self
    }

    /// Adds a table.
    pub fn table(mut self, table: TableConfig) -> Self {
        self.tables.push(table);
        self
    }

    /// Sets the checkpoint directory.
    pub fn checkpoint_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.checkpoint_dir = dir;
        self
    }

    /// Enables restoring tables from checkpoints at start-up.
    pub fn restore_from_checkpoint(mut self, v: bool) -> Self {
        self.restore_from_checkpoint = v;
        self
    }

    /// Checks the configuration of the server and of every table.
    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(ReplayServerError::Config("no table is configured".into()).into());
        }
        let mut names = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !names.insert(table.name.as_str()) {
                return Err(ReplayServerError::Config(format!(
                    "table {} is configured twice",
                    table.name
                ))
                .into());
            }
        }
        if self.restore_from_checkpoint && self.checkpoint_dir.is_none() {
            return Err(ReplayServerError::Config(
                "restore_from_checkpoint requires checkpoint_dir".into(),
            )
            .into());
        }
        Ok(())
    }

    /// Constructs [`ServerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ServerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
