//! # Transport Binding Contract
//!
//! Every wire transport (pub/sub broker, HTTP, peer-to-peer) implements
//! [`TransportBinding`]. The engine drives bindings only through this trait.
//!
//! ## Lifecycle
//!
//! `start`/`stop` are idempotent. While stopped, `send`, `subscribe` and
//! `unsubscribe` fail with `TransportError::Inactive`. Stopping cancels the
//! binding's own pending correlations and clears its subscriptions; other
//! bindings are unaffected.
//!
//! ## Inbound
//!
//! Handlers registered with `on_receive` see every decoded inbound message
//! except responses consumed by a pending correlation.

use crate::error::TransportError;
use async_trait::async_trait;
use hstp_types::{Did, Message};
use std::sync::Arc;

/// Receives inbound messages from a binding.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// `binding` is the name of the binding that delivered the message.
    async fn on_message(&self, binding: &str, message: Message);
}

#[async_trait]
pub trait TransportBinding: Send + Sync {
    /// Configured instance name, unique within a node.
    fn name(&self) -> &str;

    /// Transport kind (`mqtt`, ...).
    fn kind(&self) -> &str;

    async fn start(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;

    fn is_active(&self) -> bool;

    /// Route `message` by its addressing mode.
    ///
    /// Returns the correlated response when `expectResponse` is set,
    /// `None` otherwise.
    ///
    /// # Errors
    ///
    /// - `TransportError::Inactive` - the binding is stopped
    /// - `TransportError::Timeout` - no response within the request timeout
    /// - `TransportError::Cancelled` - the binding stopped while waiting
    async fn send(&self, message: Message) -> Result<Option<Message>, TransportError>;

    /// Idempotent.
    async fn subscribe(&self, channel: &Did) -> Result<(), TransportError>;

    /// Idempotent.
    async fn unsubscribe(&self, channel: &Did) -> Result<(), TransportError>;

    /// Current subscription set.
    fn subscriptions(&self) -> Vec<Did>;

    /// Add an inbound handler. Handlers are never removed.
    fn on_receive(&self, handler: Arc<dyn InboundHandler>);

    /// Whether this binding can deliver to `destination`.
    fn can_reach(&self, _destination: &Did) -> bool {
        self.is_active()
    }
}
