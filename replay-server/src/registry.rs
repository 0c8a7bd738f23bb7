//! Tables served by a server, looked up by name.
use crate::ServerConfig;
use anyhow::Result;
use log::info;
use replay_core::{ReplayError, Table, TableCheckpoint, TableInfo};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Named tables, each with its own sampler, remover and rate limiter.
pub struct TableRegistry {
    tables: BTreeMap<String, Arc<Table>>,
    checkpoint_dir: Option<PathBuf>,
}

fn checkpoint_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.ckpt", name))
}

impl TableRegistry {
    /// Builds the tables of a server, restoring them from checkpoints if
    /// configured.
    pub fn build(config: &ServerConfig) -> Result<Self> {
        config.validate()?;

        let mut tables = BTreeMap::new();
        for table_config in &config.tables {
            let restore_from = match (&config.checkpoint_dir, config.restore_from_checkpoint) {
                (Some(dir), true) => Some(checkpoint_path(dir, &table_config.name))
                    .filter(|path| path.exists()),
                _ => None,
            };
            let table = match restore_from {
                Some(path) => {
                    info!("Restoring table {} from {:?}", table_config.name, path);
                    let mut checkpoint = TableCheckpoint::load(&path)?;
                    // The configured sampler and sizes take precedence
                    checkpoint.config = table_config.clone();
                    Table::from_checkpoint(checkpoint)?
                }
                None => Table::new(table_config.clone())?,
            };
            tables.insert(table_config.name.clone(), Arc::new(table));
        }

        Ok(Self {
            tables,
            checkpoint_dir: config.checkpoint_dir.clone(),
        })
    }

    /// Returns the table with the name.
    pub fn get(&self, name: &str) -> Result<Arc<Table>, ReplayError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| ReplayError::UnknownTable(name.to_string()))
    }

    /// Names of the tables.
    pub fn names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Stats of one table, or of every table if `name` is `None`.
    pub fn info(&self, name: Option<&str>) -> Result<Vec<TableInfo>, ReplayError> {
        match name {
            Some(name) => Ok(vec![self.get(name)?.info()]),
            None => Ok(self.tables.values().map(|t| t.info()).collect()),
        }
    }

    /// Writes a checkpoint of every table into the checkpoint directory.
    pub fn checkpoint(&self) -> Result<Vec<PathBuf>, ReplayError> {
        let dir = self.checkpoint_dir.as_ref().ok_or_else(|| {
            ReplayError::Checkpoint("checkpoint_dir is not configured".into())
        })?;
        std::fs::create_dir_all(dir)?;

        let mut paths = Vec::with_capacity(self.tables.len());
        for (name, table) in &self.tables {
            let path = checkpoint_path(dir, name);
            let checkpoint = table.checkpoint();
            checkpoint.save(&path)?;
            info!(
                "Saved checkpoint of table {} ({} items) in {:?}",
                name,
                checkpoint.items.len(),
                path
            );
            paths.push(path);
        }
        Ok(paths)
    }

    /// Closes every table, waking up blocked samplers.
    pub fn close_all(&self) {
        self.tables.values().for_each(|t| t.close());
    }
}
