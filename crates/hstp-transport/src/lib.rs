//! # HSTP Transport - Bindings and Correlation
//!
//! The contract every wire transport implements, plus the pieces shared by
//! all of them:
//!
//! - [`TransportBinding`]: lifecycle, addressed send, channel subscriptions,
//!   inbound handler registration
//! - [`CorrelationTable`]: request/response matching by `inReplyTo`, with
//!   timeout, cancellation and duplicate discard
//! - [`addressing`]: pure identity → topic derivation
//! - [`codec`]: the length-prefixed frame format
//! - [`TransportRegistry`]: binding kind → constructor, populated at startup
//!
//! [`PubSubBinding`] is the reference implementation over a topic broker.
//!
//! ## Correlation Flow
//!
//! ```text
//! send(expectResponse) ──register(id)──▶ CorrelationTable ◀──complete(inReplyTo)── inbound
//!        │                                     │
//!        └────────── wait(timeout) ◀───────────┘
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod addressing;
pub mod binding;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod pubsub;
pub mod registry;

pub use addressing::{normalize, TopicLayout};
pub use binding::{InboundHandler, TransportBinding};
pub use config::{BindingConfig, RetryPolicy, TlsConfig};
pub use correlation::{Completion, CorrelationTable, PendingResponse};
pub use error::TransportError;
pub use pubsub::{BrokerConnector, BrokerSession, ConnectOptions, PubSubBinding};
pub use registry::{BindingFactory, TransportRegistry};

/// Binding kind served by [`PubSubBinding`].
pub const PUBSUB_KIND: &str = "mqtt";
