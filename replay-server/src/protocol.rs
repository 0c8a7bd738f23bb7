//! Wire protocol between the server and clients.
//!
//! Every message is one frame:
//!
//! ```text
//! [4 bytes: payload length (big-endian)] [payload: bincode-encoded Request or Response]
//! ```
//!
//! A connection carries strictly alternating requests and responses, so the
//! requests of one client are applied in the order they were sent.
use crate::ReplayServerError;
use anyhow::Result;
use replay_core::{InsertToken, Key, ReplayError, SampleBatch, Step, TableInfo};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    io::{self, Read, Write},
    path::PathBuf,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload: 256 MB.
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Requests from clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Inserts an item.
    Insert {
        /// Destination table.
        table: String,

        /// Steps of the item.
        steps: Vec<Step>,

        /// Initial priority.
        priority: f64,

        /// Token making the insert idempotent.
        token: Option<InsertToken>,
    },

    /// Samples a batch. Blocks until the table can be sampled, or at most
    /// `timeout_ms` milliseconds if given.
    Sample {
        /// Table to sample from.
        table: String,

        /// Number of items.
        batch_size: usize,

        /// Maximum waiting time.
        timeout_ms: Option<u64>,
    },

    /// Updates priorities of resident items.
    UpdatePriorities {
        /// Table holding the items.
        table: String,

        /// Keys of the items.
        keys: Vec<Key>,

        /// New priorities, one per key.
        priorities: Vec<f64>,
    },

    /// Returns the stats of one table, or of all tables if `table` is `None`.
    ServerInfo {
        /// Name of the table.
        table: Option<String>,
    },

    /// Writes checkpoints of all tables.
    Checkpoint,
}

/// Responses of the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// The item was stored under `key`.
    Inserted {
        /// Key of the item.
        key: Key,
    },

    /// A sampled batch.
    Sampled(SampleBatch),

    /// The table did not reach its minimum size within the timeout.
    Starved,

    /// Priorities were updated.
    PrioritiesUpdated {
        /// Number of updated items; stale keys are not counted.
        n_updated: usize,
    },

    /// Stats of tables.
    Info(Vec<TableInfo>),

    /// Checkpoints were written.
    Checkpointed(Vec<PathBuf>),

    /// The request failed.
    Error {
        /// Category of the error.
        kind: ErrorKind,

        /// Description of the error.
        message: String,
    },
}

/// Category of an error reported by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Invalid configuration.
    Config,

    /// The item cannot be stored.
    InvalidItem,

    /// Invalid argument or malformed request.
    InvalidArgument,

    /// No table with the name.
    UnknownTable,

    /// The table is closed, the server is shutting down.
    Closed,

    /// Checkpointing is not configured or failed.
    Checkpoint,

    /// Any other failure in the server.
    Internal,
}

impl Response {
    /// Builds an error response.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Short name of the response type, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "Inserted",
            Self::Sampled(_) => "Sampled",
            Self::Starved => "Starved",
            Self::PrioritiesUpdated { .. } => "PrioritiesUpdated",
            Self::Info(_) => "Info",
            Self::Checkpointed(_) => "Checkpointed",
            Self::Error { .. } => "Error",
        }
    }
}

impl From<ReplayError> for Response {
    fn from(e: ReplayError) -> Self {
        let kind = match &e {
            ReplayError::Config(_) => ErrorKind::Config,
            ReplayError::InvalidItem(_) => ErrorKind::InvalidItem,
            ReplayError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ReplayError::UnknownTable(_) => ErrorKind::UnknownTable,
            ReplayError::Closed(_) => ErrorKind::Closed,
            ReplayError::Checkpoint(_) => ErrorKind::Checkpoint,
            ReplayError::Io(_) => ErrorKind::Internal,
        };
        Self::error(kind, e.to_string())
    }
}

/// Encodes a message.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(msg)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ReplayServerError::FrameTooLarge(payload.len()).into());
    }
    Ok(payload)
}

/// Decodes a message.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(payload)?)
}

fn frame_len(header: [u8; 4]) -> io::Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the limit", len),
        ));
    }
    Ok(len)
}

/// Writes a frame to a blocking stream.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    w.write_all(&(payload.len() as u32).to_be_bytes())?;
    w.write_all(payload)?;
    w.flush()
}

/// Reads a frame from a blocking stream. Returns `None` if the stream ended
/// before the header.
pub fn read_frame<R: Read>(r: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match r.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let mut payload = vec![0u8; frame_len(header)?];
    r.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Writes a frame to an async stream.
pub async fn write_frame_async<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    w.write_all(&frame).await?;
    w.flush().await
}

/// Reads a frame from an async stream. Returns `None` if the stream ended
/// before the header.
pub async fn read_frame_async<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match r.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let mut payload = vec![0u8; frame_len(header)?];
    r.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::Observation;
    use std::io::Cursor;

    #[test]
    fn test_frames_on_blocking_stream() -> Result<()> {
        let request = Request::Insert {
            table: "uniform_table".into(),
            steps: vec![Step::initial(Observation::Vector(vec![0.1, f32::MIN_POSITIVE]))],
            priority: 1.0,
            token: None,
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &encode(&request)?)?;
        write_frame(&mut buf, &encode(&Request::Checkpoint)?)?;

        let mut rdr = Cursor::new(buf);
        let first: Request = decode(&read_frame(&mut rdr)?.unwrap())?;
        let second: Request = decode(&read_frame(&mut rdr)?.unwrap())?;
        assert_eq!(first, request);
        assert_eq!(second, Request::Checkpoint);
        assert!(read_frame(&mut rdr)?.is_none());
        Ok(())
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        let mut rdr = Cursor::new(u32::MAX.to_be_bytes().to_vec());
        let err = read_frame(&mut rdr).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_error_kind_of_core_errors() {
        let response = Response::from(ReplayError::UnknownTable("x".into()));
        assert!(matches!(
            response,
            Response::Error {
                kind: ErrorKind::UnknownTable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_frames_on_async_stream() -> Result<()> {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let response = Response::PrioritiesUpdated { n_updated: 3 };
        write_frame_async(&mut a, &encode(&response)?).await?;
        drop(a);
        let received: Response = decode(&read_frame_async(&mut b).await?.unwrap())?;
        assert_eq!(received, response);
        assert!(read_frame_async(&mut b).await?.is_none());
        Ok(())
    }
}
