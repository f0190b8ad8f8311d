//! Transport error taxonomy.

use hstp_types::{MessageError, MessageId};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation attempted on a stopped binding. Not retryable.
    #[error("Transport '{binding}' is not active")]
    Inactive { binding: String },

    /// No correlated response arrived in time.
    #[error("No response to {id} within {timeout:?}")]
    Timeout { id: MessageId, timeout: Duration },

    /// The binding stopped while the caller was waiting.
    #[error("Request {id} cancelled: transport stopped")]
    Cancelled { id: MessageId },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Frame codec error: {0}")]
    Codec(String),

    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Unknown transport kind '{0}'")]
    UnknownKind(String),

    #[error("Invalid binding configuration: {0}")]
    Config(String),
}

impl From<MessageError> for TransportError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::PayloadTooLarge { limit } => Self::PayloadTooLarge { limit },
            other => Self::Codec(other.to_string()),
        }
    }
}
