//! Blocking client of a [`Server`](crate::Server).
use crate::{
    protocol::{decode, encode, read_frame, write_frame, Request, Response},
    ReplayServerError,
};
use anyhow::Result;
use log::{debug, warn};
use replay_core::{ItemSink, Key, NewItem, SampleBatch, Step, TableInfo, TrajectoryWriter};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, BufReader, BufWriter},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    path::PathBuf,
    thread,
    time::Duration,
};

/// Backoff policy for establishing connections.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RetryConfig {
    /// Number of connection attempts.
    pub attempts: usize,

    /// Waiting time after the first failed attempt, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound of the waiting time, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn open(addrs: &[SocketAddr]) -> io::Result<Self> {
        let stream = TcpStream::connect(addrs)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }
}

/// Handle of a producer or a consumer.
///
/// Requests are synchronous: each call sends one request and waits for its
/// response, so the server applies the calls of one client in program order.
/// In particular, priorities updated with
/// [`update_priorities`](Self::update_priorities) are visible to the next
/// [`sample`](Self::sample) of the same client.
pub struct Client {
    addrs: Vec<SocketAddr>,
    retry: RetryConfig,
    conn: Connection,
}

impl Client {
    /// Connects to a server.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with_retry(
            addr,
            RetryConfig {
                attempts: 1,
                ..RetryConfig::default()
            },
        )
    }

    /// Connects to a server, retrying with exponential backoff.
    pub fn connect_with_retry(addr: impl ToSocketAddrs, retry: RetryConfig) -> Result<Self> {
        let addrs = addr.to_socket_addrs()?.collect::<Vec<_>>();
        let conn = Self::open_with_retry(&addrs, &retry)?;
        debug!("Connected to replay server at {:?}", addrs);
        Ok(Self { addrs, retry, conn })
    }

    fn open_with_retry(addrs: &[SocketAddr], retry: &RetryConfig) -> io::Result<Connection> {
        let mut backoff = retry.initial_backoff_ms;
        let mut attempt = 1;
        loop {
            match Connection::open(addrs) {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt < retry.attempts => {
                    warn!(
                        "Connection attempt {} to {:?} failed: {}; retrying in {} ms",
                        attempt, addrs, e, backoff
                    );
                    thread::sleep(Duration::from_millis(backoff));
                    backoff = (backoff * 2).min(retry.max_backoff_ms);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Re-establishes the connection, e.g. after a transient failure.
    pub fn reconnect(&mut self) -> Result<()> {
        self.conn = Self::open_with_retry(&self.addrs, &self.retry)?;
        debug!("Reconnected to replay server at {:?}", self.addrs);
        Ok(())
    }

    fn call(&mut self, request: &Request) -> Result<Response> {
        write_frame(&mut self.conn.writer, &encode(request)?)?;
        let payload =
            read_frame(&mut self.conn.reader)?.ok_or(ReplayServerError::ConnectionClosed)?;
        match decode::<Response>(&payload)? {
            Response::Error { kind, message } => {
                Err(ReplayServerError::Remote { kind, message }.into())
            }
            response => Ok(response),
        }
    }

    fn unexpected<T>(response: Response) -> Result<T> {
        Err(ReplayServerError::UnexpectedResponse(response.name().to_string()).into())
    }

    /// Inserts an item and returns its key.
    pub fn insert(&mut self, table: &str, steps: Vec<Step>, priority: f64) -> Result<Key> {
        self.insert_item(NewItem {
            table: table.to_string(),
            steps,
            priority,
            token: None,
        })
    }

    /// Samples `batch_size` items, blocking until the table reaches its
    /// minimum size.
    pub fn sample(&mut self, table: &str, batch_size: usize) -> Result<SampleBatch> {
        match self.sample_inner(table, batch_size, None)? {
            Some(batch) => Ok(batch),
            None => Err(ReplayServerError::UnexpectedResponse("Starved".into()).into()),
        }
    }

    /// Samples `batch_size` items, waiting at most `timeout`. Returns `None`
    /// if the table did not reach its minimum size in time.
    pub fn sample_timeout(
        &mut self,
        table: &str,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Option<SampleBatch>> {
        self.sample_inner(table, batch_size, Some(timeout.as_millis() as u64))
    }

    fn sample_inner(
        &mut self,
        table: &str,
        batch_size: usize,
        timeout_ms: Option<u64>,
    ) -> Result<Option<SampleBatch>> {
        let request = Request::Sample {
            table: table.to_string(),
            batch_size,
            timeout_ms,
        };
        match self.call(&request)? {
            Response::Sampled(batch) => Ok(Some(batch)),
            Response::Starved => Ok(None),
            response => Self::unexpected(response),
        }
    }

    /// Sets priorities of items. Keys of evicted items are ignored; returns
    /// the number of updated items.
    pub fn update_priorities(
        &mut self,
        table: &str,
        keys: &[Key],
        priorities: &[f64],
    ) -> Result<usize> {
        let request = Request::UpdatePriorities {
            table: table.to_string(),
            keys: keys.to_vec(),
            priorities: priorities.to_vec(),
        };
        match self.call(&request)? {
            Response::PrioritiesUpdated { n_updated } => Ok(n_updated),
            response => Self::unexpected(response),
        }
    }

    /// Returns the stats of a table.
    pub fn server_info(&mut self, table: &str) -> Result<TableInfo> {
        let request = Request::ServerInfo {
            table: Some(table.to_string()),
        };
        match self.call(&request)? {
            Response::Info(mut infos) if infos.len() == 1 => Ok(infos.remove(0)),
            response => Self::unexpected(response),
        }
    }

    /// Returns the stats of all tables.
    pub fn server_info_all(&mut self) -> Result<Vec<TableInfo>> {
        match self.call(&Request::ServerInfo { table: None })? {
            Response::Info(infos) => Ok(infos),
            response => Self::unexpected(response),
        }
    }

    /// Asks the server to checkpoint all tables; returns the written files.
    pub fn checkpoint(&mut self) -> Result<Vec<PathBuf>> {
        match self.call(&Request::Checkpoint)? {
            Response::Checkpointed(paths) => Ok(paths),
            response => Self::unexpected(response),
        }
    }

    /// Creates a writer of `n_steps`-step items into `table` over this client.
    pub fn writer(&mut self, table: &str, n_steps: usize) -> Result<TrajectoryWriter<&mut Self>> {
        Ok(TrajectoryWriter::new(self, table, n_steps)?)
    }
}

impl ItemSink for Client {
    /// Sends an insert request.
    ///
    /// If the item carries an insert token and the connection fails, the
    /// client reconnects and resends it once; the server drops the resend if
    /// the first request had already been applied.
    fn insert_item(&mut self, item: NewItem) -> Result<Key> {
        let retriable = item.token.is_some();
        let request = Request::Insert {
            table: item.table,
            steps: item.steps,
            priority: item.priority,
            token: item.token,
        };
        let response = match self.call(&request) {
            Ok(response) => response,
            Err(e) if retriable && is_connection_error(&e) => {
                warn!("Insert failed: {}; reconnecting", e);
                self.reconnect()?;
                self.call(&request)?
            }
            Err(e) => return Err(e),
        };
        match response {
            Response::Inserted { key } => Ok(key),
            response => Self::unexpected(response),
        }
    }
}

fn is_connection_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<io::Error>().is_some()
        || matches!(
            e.downcast_ref::<ReplayServerError>(),
            Some(ReplayServerError::ConnectionClosed)
        )
}
