#![warn(missing_docs)]
//! Replay buffer server and client.
//!
//! A [`Server`] binds one or more [`Table`](replay_core::Table)s behind a TCP
//! endpoint and routes insert, sample, priority-update and stats requests by
//! table name. Producers and consumers talk to it through a blocking
//! [`Client`]:
//!
//! * [`Collector`] runs episodes of an [`Env`](replay_core::Env) and writes
//!   overlapping n-step items through a
//!   [`TrajectoryWriter`](replay_core::TrajectoryWriter).
//! * [`Consumer`] samples batches, assembles n-step transitions with
//!   importance weights and sends back updated priorities.
//!
//! ```no_run
//! use replay_core::TableConfig;
//! use replay_server::{Client, Server, ServerConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServerConfig::default().tables(vec![TableConfig::prioritized()]);
//! let server = Server::start(config)?;
//! let mut client = Client::connect(("127.0.0.1", server.port()))?;
//! let info = client.server_info("priority_table")?;
//! assert_eq!(info.current_size, 0);
//! # Ok(())
//! # }
//! ```
mod client;
mod collector;
mod config;
mod consumer;
mod error;
pub mod protocol;
mod registry;
mod server;
pub use client::{Client, RetryConfig};
pub use collector::{Collector, CollectorConfig, EpisodeStats};
pub use config::ServerConfig;
pub use consumer::{Consumer, ConsumerConfig, TrainingBatch};
pub use error::ReplayServerError;
pub use protocol::ErrorKind;
pub use registry::TableRegistry;
pub use server::Server;
