//! Per-message processing context.

use hstp_types::{Did, Header, HeaderBuilder, Message, ResolvedDid, Timestamp};

/// A message travelling through the interceptor chain, plus what the chain
/// has learned about it so far.
#[derive(Debug)]
pub struct MessageContext {
    pub message: Message,
    /// This node's identity.
    pub local: Did,
    /// Name of the binding that delivered the message, if inbound.
    pub binding: Option<String>,
    /// Set by the identity interceptor.
    pub source_identity: Option<ResolvedDid>,
    pub received_at: Timestamp,
}

impl MessageContext {
    #[must_use]
    pub fn new(message: Message, local: Did) -> Self {
        Self {
            message,
            local,
            binding: None,
            source_identity: None,
            received_at: Timestamp::now(),
        }
    }

    #[must_use]
    pub fn via(mut self, binding: impl Into<String>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        self.message.header()
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        self.message.operation()
    }

    /// Replace the message with a copy carrying an extra header property.
    #[must_use]
    pub fn annotate(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            message: self.message.with_property(key, value),
            ..self
        }
    }

    /// Start a response to this message. The response is sent as the
    /// identity the request was addressed to, falling back to this node.
    pub fn reply(&self, operation: &str) -> HeaderBuilder {
        let header = self.header();
        let source = header
            .destination
            .clone()
            .unwrap_or_else(|| self.local.clone());
        header.reply(operation, source)
    }
}
