//! Errors in the server and the client.
use crate::ErrorKind;
use thiserror::Error;

/// Errors in the communication between the server and clients.
#[derive(Error, Debug)]
pub enum ReplayServerError {
    /// The server failed to process a request.
    #[error("Remote error ({kind:?}): {message}")]
    Remote {
        /// Category of the error.
        kind: ErrorKind,

        /// Message from the server.
        message: String,
    },

    /// The server answered with a response of the wrong type.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A frame exceeded [`MAX_FRAME_SIZE`](crate::protocol::MAX_FRAME_SIZE).
    #[error("Frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    /// The peer closed the connection.
    #[error("Connection closed by the peer")]
    ConnectionClosed,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}
