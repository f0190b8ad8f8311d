//! Engine error taxonomy.

use hstp_identity::IdentityError;
use hstp_transport::TransportError;
use hstp_types::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No handler is registered for the operation. Fatal for the message.
    #[error("Unresolvable operation '{operation}'")]
    UnresolvableOperation { operation: String },

    /// An interceptor refused the message.
    #[error("Message rejected by {interceptor}: {reason}")]
    Rejected { interceptor: String, reason: String },

    #[error("Handler for '{operation}' failed: {reason}")]
    Handler { operation: String, reason: String },

    /// No active binding can deliver to the destination.
    #[error("No transport can reach {destination}")]
    NoRoute { destination: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Message(#[from] MessageError),
}

impl EngineError {
    pub fn rejected(interceptor: &str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            interceptor: interceptor.to_string(),
            reason: reason.into(),
        }
    }
}
