//! # HSTP Types
//!
//! Wire-level types shared across the node.
//!
//! ## Design Principles
//!
//! - **Immutability**: a `Message` is never mutated once built. Annotating a
//!   message consumes it and yields a new one.
//! - **Addressing**: a header carries at most one dominant addressing mode.
//!   A channel always wins over a destination.
//! - **Identity values**: `Did` is validated on construction and every derived
//!   identifier is a fresh value.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod document;
pub mod errors;
pub mod header;
pub mod identity;
pub mod message;
pub mod time;

pub use document::{
    DidDocument, ResolutionMetadata, ResolvedDid, ServiceEndpoint, VerificationMethod,
};
pub use errors::{DidError, MessageError};
pub use header::{Addressing, Header, HeaderBuilder, MessageId};
pub use identity::Did;
pub use message::{Message, Payload, PayloadStream};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource, Timestamp};

/// Media type used when a message does not declare one.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";
