//! # HSTP Bus - In-Process Broker and Replay Cache
//!
//! Two building blocks used by transport bindings and interceptors:
//!
//! - [`InMemoryBroker`]: an exact-topic publish/subscribe broker with
//!   per-client delivery queues. It stands in for an MQTT broker when nodes
//!   share a process, and exposes hooks to sever clients and simulate outages.
//! - [`ReplayCache`]: a time-bounded cache of seen message ids.
//!
//! ```text
//! ┌──────────────┐   publish(topic)   ┌──────────────┐   deliver   ┌──────────────┐
//! │ BrokerClient │ ─────────────────▶ │ InMemoryBroker│ ──────────▶ │ subscribers  │
//! └──────────────┘                    └──────────────┘             └──────────────┘
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod replay;

pub use broker::{BrokerClient, BrokerError, Delivery, InMemoryBroker};
pub use replay::{ReplayCache, ReplayConfig, ReplayError};

/// Deliveries buffered per client before new ones are dropped.
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CLIENT_QUEUE_CAPACITY, 1000);
    }
}
