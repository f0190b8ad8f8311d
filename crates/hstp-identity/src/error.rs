//! Identity resolution errors.

use hstp_types::{Did, DidError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// No resolver is registered for the identity's method.
    #[error("No resolver registered for DID method '{method}'")]
    UnsupportedMethod { method: String },

    /// The resolver has no document for the identity.
    #[error("DID not found: {0}")]
    NotFound(Did),

    /// Resolution failed (network, parse, registry error).
    #[error("Failed to resolve {did}: {reason}")]
    Resolution { did: Did, reason: String },

    /// The identity string itself is malformed.
    #[error(transparent)]
    Malformed(#[from] DidError),
}
