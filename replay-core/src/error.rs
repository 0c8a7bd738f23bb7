//! Errors in the library.
use thiserror::Error;

/// Errors raised by tables, writers and n-step assembly.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Invalid configuration, detected at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An item that cannot be stored in the table.
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// Invalid argument of an operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No table is registered under the name.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// The table was closed while the operation was waiting.
    #[error("Table {0} is closed")]
    Closed(String),

    /// A checkpoint could not be written or restored.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
