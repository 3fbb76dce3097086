//! Error types for the Playroom client.

use thiserror::Error;

/// Errors that can occur when using the Playroom client.
#[derive(Debug, Error)]
pub enum PlayroomError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// No connector in the chain could establish a transport.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The REST backend answered with a non-success status.
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The `message` field of the response body, or a generic fallback.
        message: String,
    },

    /// The HTTP client failed before a response could be read.
    #[error("http error: {0}")]
    Http(String),

    /// A board arrived with the wrong number of cells.
    #[error("board must have 9 cells, got {0}")]
    InvalidBoardLength(usize),

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A request was refused before it was sent (e.g. empty login fields).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Playroom client operations.
pub type Result<T> = std::result::Result<T, PlayroomError>;
