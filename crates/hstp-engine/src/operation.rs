//! # Operation Registry
//!
//! Maps an operation name (case-sensitive) to its handler. The registry is
//! filled before the engine is built and never mutated afterwards, so
//! lookups need no locking.

use crate::chain::{HandlerResult, Terminal};
use crate::context::MessageContext;
use crate::error::EngineError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Handles one operation. A returned message is routed back out by the
/// engine.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, ctx: MessageContext) -> HandlerResult;
}

#[derive(Default, Clone)]
pub struct OperationRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `operation`.
    pub fn register(&mut self, operation: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        let operation = operation.into();
        info!("[Operations] Registering handler: {}", operation);
        self.handlers.insert(operation, handler);
    }

    #[must_use]
    pub fn resolve(&self, operation: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(operation).cloned()
    }

    #[must_use]
    pub fn contains(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }

    /// Registered operation names, sorted.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Terminal for OperationRegistry {
    async fn dispatch(&self, ctx: MessageContext) -> HandlerResult {
        let handler = self.resolve(ctx.operation()).ok_or_else(|| {
            EngineError::UnresolvableOperation {
                operation: ctx.operation().to_string(),
            }
        })?;
        debug!(
            message_id = %ctx.message.id(),
            operation = %ctx.operation(),
            "Dispatching to handler"
        );
        handler.handle(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hstp_types::{Did, Header, Message};

    struct Echo;

    #[async_trait]
    impl OperationHandler for Echo {
        async fn handle(&self, ctx: MessageContext) -> HandlerResult {
            let header = ctx.reply("echoed").build()?;
            Ok(Some(Message::without_payload(header)))
        }
    }

    fn context(operation: &str) -> MessageContext {
        let header = Header::builder(operation, Did::parse("did:key:peer").unwrap())
            .build()
            .unwrap();
        MessageContext::new(
            Message::without_payload(header),
            Did::parse("did:key:local").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_dispatches_registered_operation() {
        let mut registry = OperationRegistry::new();
        registry.register("echo", Arc::new(Echo));

        let response = registry.dispatch(context("echo")).await.unwrap().unwrap();

        assert_eq!(response.operation(), "echoed");
        assert_eq!(
            response.header().destination.as_ref().map(Did::as_str),
            Some("did:key:peer")
        );
        assert_eq!(response.header().source.as_str(), "did:key:local");
    }

    #[tokio::test]
    async fn test_lookup_is_case_sensitive() {
        let mut registry = OperationRegistry::new();
        registry.register("echo", Arc::new(Echo));

        let result = registry.dispatch(context("Echo")).await;

        assert!(matches!(
            result,
            Err(EngineError::UnresolvableOperation { operation }) if operation == "Echo"
        ));
        assert!(registry.contains("echo"));
        assert_eq!(registry.operations(), vec!["echo".to_string()]);
    }
}
