//! # Error Types
//!
//! Errors raised while constructing or consuming shared types.

use thiserror::Error;

/// Errors from parsing or deriving decentralized identifiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DidError {
    /// Identifier is empty.
    #[error("Identity is empty")]
    Empty,

    /// Identifier does not have the `<scheme>:<method>:<method-specific-id>` shape.
    #[error("Malformed identity '{value}': {reason}")]
    Malformed { value: String, reason: &'static str },

    /// A derived segment is not usable inside an identifier.
    #[error("Invalid identity segment '{0}'")]
    InvalidSegment(String),
}

/// Errors related to message construction and payload consumption.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Header is missing its operation name.
    #[error("Message header has no operation")]
    MissingOperation,

    /// Payload exceeded the configured collection limit.
    #[error("Payload exceeds limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The payload stream failed while being read.
    #[error("Payload stream failed: {0}")]
    Stream(#[from] std::io::Error),
}
