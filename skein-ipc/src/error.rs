//! IPC error types

use thiserror::Error;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Underlying stream or socket failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream before a complete segment arrived
    #[error("Truncated message: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    /// Payload length does not fit the 4-byte length prefix
    #[error("Frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// Request/reply alternation violated by the caller
    #[error("Usage error: {0}")]
    Usage(&'static str),

    /// The connection failed while a request was in flight
    #[error("Connection lost before a reply arrived")]
    ConnectionLost,

    /// The server refused our key; the socket will not reconnect
    #[error("Authentication rejected by peer")]
    AuthenticationRejected,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl IpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IpcError::Io(_) | IpcError::Truncated { .. } | IpcError::ConnectionLost
        )
    }

    /// Check if this error is a programming mistake by the caller
    pub fn is_usage(&self) -> bool {
        matches!(self, IpcError::Usage(_))
    }
}
