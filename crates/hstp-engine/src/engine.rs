//! # Engine
//!
//! Owns the operation registry, the interceptor chain, the identity
//! resolver and the transport bindings. Inbound messages from any binding
//! enter through [`Engine::handle_message`]; responses leave through
//! [`Engine::send_response`].
//!
//! ## Routing
//!
//! A message is sent on the first binding (in registration order) that can
//! reach its channel or destination. Unaddressed messages go out on the first
//! active binding. Responses prefer the binding the request arrived on.
//!
//! ## Failures
//!
//! Processing errors are returned to the caller of `handle_message`. When
//! the failed request expected a response, an `error` reply carrying a
//! status code is sent first so the requester does not wait for its timeout.

use crate::chain::{HandlerResult, InterceptorChain};
use crate::context::MessageContext;
use crate::error::EngineError;
use crate::handlers::{PingHandler, PongHandler, ProbeTracker, PING, PONG};
use crate::operation::{OperationHandler, OperationRegistry};
use async_trait::async_trait;
use hstp_identity::CachingDidResolver;
use hstp_transport::{InboundHandler, TransportBinding, TransportError};
use hstp_types::{Addressing, Did, Header, Message, MessageId};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Operation of the reply sent when a request fails.
pub const ERROR_OPERATION: &str = "error";
/// Header property carrying the failure description on an error reply.
pub const ERROR_PROPERTY: &str = "hstp-error";

/// Assembles an [`Engine`]. `ping` and `pong` are registered up front and
/// may be replaced.
pub struct EngineBuilder {
    local: Did,
    resolver: Arc<CachingDidResolver>,
    operations: OperationRegistry,
    chain: InterceptorChain,
    bindings: Vec<Arc<dyn TransportBinding>>,
    probes: Arc<ProbeTracker>,
}

impl EngineBuilder {
    pub fn new(local: Did, resolver: Arc<CachingDidResolver>) -> Self {
        let probes = Arc::new(ProbeTracker::new());
        let mut operations = OperationRegistry::new();
        operations.register(PING, Arc::new(PingHandler));
        operations.register(PONG, Arc::new(PongHandler::new(probes.clone())));

        Self {
            local,
            resolver,
            operations,
            chain: InterceptorChain::new(),
            bindings: Vec::new(),
            probes,
        }
    }

    #[must_use]
    pub fn operation(
        mut self,
        operation: impl Into<String>,
        handler: Arc<dyn OperationHandler>,
    ) -> Self {
        self.operations.register(operation, handler);
        self
    }

    /// Append an interceptor. Interceptors run in the order added.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Arc<dyn crate::chain::Interceptor>) -> Self {
        self.chain.push(interceptor);
        self
    }

    #[must_use]
    pub fn binding(mut self, binding: Arc<dyn TransportBinding>) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Build the engine and attach it as the inbound handler of every
    /// binding.
    ///
    /// # Errors
    ///
    /// `TransportError::Config` if two bindings share a name.
    pub fn build(self) -> Result<Arc<Engine>, EngineError> {
        let mut names = HashSet::new();
        for binding in &self.bindings {
            if !names.insert(binding.name().to_string()) {
                return Err(TransportError::Config(format!(
                    "duplicate binding name '{}'",
                    binding.name()
                ))
                .into());
            }
        }

        let engine = Arc::new(Engine {
            local: self.local,
            resolver: self.resolver,
            operations: self.operations,
            chain: self.chain,
            bindings: self.bindings,
            probes: self.probes,
        });

        for binding in &engine.bindings {
            binding.on_receive(Arc::new(EngineInbound {
                engine: Arc::downgrade(&engine),
            }));
        }

        info!(
            "[Engine] Built for {} with {} binding(s), interceptors {:?}, operations {:?}",
            engine.local,
            engine.bindings.len(),
            engine.chain.names(),
            engine.operations.operations()
        );
        Ok(engine)
    }
}

pub struct Engine {
    local: Did,
    resolver: Arc<CachingDidResolver>,
    operations: OperationRegistry,
    chain: InterceptorChain,
    bindings: Vec<Arc<dyn TransportBinding>>,
    probes: Arc<ProbeTracker>,
}

impl Engine {
    #[must_use]
    pub fn local(&self) -> &Did {
        &self.local
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<CachingDidResolver> {
        &self.resolver
    }

    #[must_use]
    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    #[must_use]
    pub fn interceptors(&self) -> Vec<String> {
        self.chain.names()
    }

    #[must_use]
    pub fn probes(&self) -> &ProbeTracker {
        &self.probes
    }

    #[must_use]
    pub fn bindings(&self) -> &[Arc<dyn TransportBinding>] {
        &self.bindings
    }

    #[must_use]
    pub fn binding(&self, name: &str) -> Option<Arc<dyn TransportBinding>> {
        self.bindings.iter().find(|b| b.name() == name).cloned()
    }

    /// Start every binding in registration order.
    ///
    /// # Errors
    ///
    /// The first binding that fails to start; bindings started before it
    /// stay active.
    pub async fn start(&self) -> Result<(), EngineError> {
        info!("[Engine] Starting {} binding(s)", self.bindings.len());
        for binding in &self.bindings {
            binding.start().await.map_err(|e| {
                warn!(binding = binding.name(), error = %e, "[Engine] Binding failed to start");
                e
            })?;
        }
        Ok(())
    }

    /// Stop every binding. Failures are logged and do not stop the rest.
    pub async fn stop(&self) {
        info!("[Engine] Stopping {} binding(s)", self.bindings.len());
        for binding in &self.bindings {
            if let Err(e) = binding.stop().await {
                warn!(binding = binding.name(), error = %e, "[Engine] Binding failed to stop");
            }
        }
    }

    /// Run a context through the interceptor chain and its handler without
    /// routing the result.
    pub async fn process(&self, ctx: MessageContext) -> HandlerResult {
        self.chain.process(ctx, &self.operations).await
    }

    /// Process an inbound message and route any response back out.
    ///
    /// `origin` names the binding that delivered the message. Returns the id
    /// of the response sent, if any.
    ///
    /// # Errors
    ///
    /// Whatever the chain or handler failed with, or the failure to send
    /// the response.
    pub async fn handle_message(
        &self,
        message: Message,
        origin: Option<&str>,
    ) -> Result<Option<MessageId>, EngineError> {
        let request = message.header().clone();
        let mut ctx = MessageContext::new(message, self.local.clone());
        if let Some(name) = origin {
            ctx = ctx.via(name);
        }

        match self.process(ctx).await {
            Ok(Some(response)) => {
                let id = response.id();
                self.send_response(response, origin).await?;
                Ok(Some(id))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                if request.expect_response && !request.is_response() {
                    self.reply_with_error(&request, &e, origin).await;
                }
                Err(e)
            }
        }
    }

    /// Send `message` on the first binding that can reach it.
    ///
    /// # Errors
    ///
    /// - `EngineError::NoRoute` - no active binding reaches the target
    /// - `EngineError::Transport` - the binding failed, timed out or was
    ///   stopped while waiting
    pub async fn send(&self, message: Message) -> Result<Option<Message>, EngineError> {
        let binding = self.route(message.header(), None)?;
        debug!(
            message_id = %message.id(),
            operation = %message.operation(),
            binding = binding.name(),
            "Sending message"
        );
        Ok(binding.send(message).await?)
    }

    /// Send a response, preferring the binding named by `via`.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send).
    pub async fn send_response(
        &self,
        response: Message,
        via: Option<&str>,
    ) -> Result<(), EngineError> {
        let binding = self.route(response.header(), via)?;
        let message_id = response.id();
        let operation = response.operation().to_string();

        if let Some(reply) = binding.send(response).await? {
            debug!(
                message_id = %message_id,
                operation = %operation,
                reply_id = %reply.id(),
                "Response was itself answered"
            );
        }
        Ok(())
    }

    /// Subscribe every active binding to `channel`.
    ///
    /// # Errors
    ///
    /// `EngineError::NoRoute` when no binding is active, or the first
    /// subscription failure.
    pub async fn subscribe(&self, channel: &Did) -> Result<(), EngineError> {
        let mut subscribed = false;
        for binding in self.bindings.iter().filter(|b| b.is_active()) {
            binding.subscribe(channel).await?;
            subscribed = true;
        }
        if !subscribed {
            return Err(EngineError::NoRoute {
                destination: channel.to_string(),
            });
        }
        Ok(())
    }

    /// Unsubscribe every active binding from `channel`.
    ///
    /// # Errors
    ///
    /// The first unsubscription failure.
    pub async fn unsubscribe(&self, channel: &Did) -> Result<(), EngineError> {
        for binding in self.bindings.iter().filter(|b| b.is_active()) {
            binding.unsubscribe(channel).await?;
        }
        Ok(())
    }

    /// Ping `destination` and measure the round trip.
    ///
    /// # Errors
    ///
    /// - routing and transport failures as for [`send`](Self::send)
    /// - `EngineError::Handler` - the peer answered with something other
    ///   than `pong`
    pub async fn probe(&self, destination: &Did) -> Result<Duration, EngineError> {
        let header = Header::builder(PING, self.local.clone())
            .destination(destination.clone())
            .expect_response(true)
            .build()?;
        let id = header.id;
        let started = Instant::now();
        self.probes.start(id);

        let outcome = self.send(Message::without_payload(header)).await;
        let response = match outcome {
            Ok(Some(response)) => response,
            Ok(None) => {
                self.probes.forget(&id);
                return Err(EngineError::Handler {
                    operation: PING.to_string(),
                    reason: "no response".to_string(),
                });
            }
            Err(e) => {
                self.probes.forget(&id);
                return Err(e);
            }
        };

        if response.operation() != PONG {
            self.probes.forget(&id);
            return Err(EngineError::Handler {
                operation: PING.to_string(),
                reason: format!(
                    "unexpected response '{}' (status {:?})",
                    response.operation(),
                    response.header().status
                ),
            });
        }

        let rtt = self.probes.finish(&id).unwrap_or_else(|| started.elapsed());
        debug!(
            message_id = %id,
            destination = %destination,
            rtt_ms = rtt.as_millis() as u64,
            "Probe answered"
        );
        Ok(rtt)
    }

    fn route(
        &self,
        header: &Header,
        preferred: Option<&str>,
    ) -> Result<Arc<dyn TransportBinding>, EngineError> {
        let target = match header.addressing() {
            Addressing::Channel(did) | Addressing::Direct(did) => Some(did),
            Addressing::Broadcast => None,
        };
        let usable = |binding: &Arc<dyn TransportBinding>| match target {
            Some(did) => binding.can_reach(did),
            None => binding.is_active(),
        };

        if let Some(binding) = preferred
            .and_then(|name| self.binding(name))
            .filter(|b| usable(b))
        {
            return Ok(binding);
        }

        self.bindings
            .iter()
            .find(|b| usable(b))
            .cloned()
            .ok_or_else(|| EngineError::NoRoute {
                destination: target.map_or_else(|| "broadcast".to_string(), Did::to_string),
            })
    }

    async fn reply_with_error(&self, request: &Header, error: &EngineError, via: Option<&str>) {
        let status = match error {
            EngineError::UnresolvableOperation { .. } => 404,
            EngineError::Rejected { .. } => 403,
            _ => 500,
        };
        let source = request
            .destination
            .clone()
            .unwrap_or_else(|| self.local.clone());
        let reply = request
            .reply(ERROR_OPERATION, source)
            .status(status)
            .property(ERROR_PROPERTY, error.to_string())
            .build();

        let sent = match reply {
            Ok(header) => self.send_response(Message::without_payload(header), via).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            warn!(
                message_id = %request.id,
                operation = %request.operation,
                error = %e,
                "Failed to send error reply"
            );
        }
    }
}

/// Feeds messages from a binding into the engine.
struct EngineInbound {
    engine: Weak<Engine>,
}

#[async_trait]
impl InboundHandler for EngineInbound {
    async fn on_message(&self, binding: &str, message: Message) {
        let Some(engine) = self.engine.upgrade() else {
            debug!(binding, "Engine dropped, ignoring inbound message");
            return;
        };
        let message_id = message.id();
        let operation = message.operation().to_string();

        if let Err(e) = engine.handle_message(message, Some(binding)).await {
            warn!(
                message_id = %message_id,
                operation = %operation,
                binding,
                error = %e,
                "Inbound message failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Interceptor, Next};
    use hstp_identity::{ResolverConfig, StaticResolver};
    use hstp_types::SystemTimeSource;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records sent messages and answers pings itself.
    struct RecordingBinding {
        name: &'static str,
        active: AtomicBool,
        reachable: Option<Did>,
        sent: Mutex<Vec<Message>>,
        handlers: Mutex<Vec<Arc<dyn InboundHandler>>>,
    }

    impl RecordingBinding {
        fn new(name: &'static str, reachable: Option<Did>) -> Arc<Self> {
            Arc::new(Self {
                name,
                active: AtomicBool::new(false),
                reachable,
                sent: Mutex::new(Vec::new()),
                handlers: Mutex::new(Vec::new()),
            })
        }

        fn sent_operations(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .map(|m| m.operation().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl TransportBinding for RecordingBinding {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> &str {
            "recording"
        }

        async fn start(&self) -> Result<(), TransportError> {
            self.active.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<(), TransportError> {
            self.active.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        async fn send(&self, message: Message) -> Result<Option<Message>, TransportError> {
            if !self.is_active() {
                return Err(TransportError::Inactive {
                    binding: self.name.to_string(),
                });
            }
            let header = message.header().clone();
            self.sent.lock().push(message);
            if header.expect_response && header.operation == PING {
                let destination = header.destination.clone().unwrap();
                let pong = header.reply(PONG, destination).build().unwrap();
                return Ok(Some(Message::without_payload(pong)));
            }
            Ok(None)
        }

        async fn subscribe(&self, _channel: &Did) -> Result<(), TransportError> {
            Ok(())
        }

        async fn unsubscribe(&self, _channel: &Did) -> Result<(), TransportError> {
            Ok(())
        }

        fn subscriptions(&self) -> Vec<Did> {
            Vec::new()
        }

        fn on_receive(&self, handler: Arc<dyn InboundHandler>) {
            self.handlers.lock().push(handler);
        }

        fn can_reach(&self, destination: &Did) -> bool {
            self.is_active() && self.reachable.as_ref().map_or(true, |d| d == destination)
        }
    }

    struct Deny;

    #[async_trait]
    impl Interceptor for Deny {
        fn name(&self) -> &str {
            "deny"
        }

        async fn intercept(&self, _ctx: MessageContext, _next: Next<'_>) -> HandlerResult {
            Err(EngineError::rejected("deny", "no entry"))
        }
    }

    fn did(s: &str) -> Did {
        Did::parse(s).unwrap()
    }

    fn resolver() -> Arc<CachingDidResolver> {
        let documents = Arc::new(StaticResolver::new(Arc::new(SystemTimeSource::new())));
        Arc::new(CachingDidResolver::new(documents, &ResolverConfig::default()))
    }

    fn ping_from(source: &str, to: &str) -> Message {
        let header = Header::builder(PING, did(source))
            .destination(did(to))
            .expect_response(true)
            .build()
            .unwrap();
        Message::without_payload(header)
    }

    #[tokio::test]
    async fn test_build_attaches_inbound_handler() {
        let binding = RecordingBinding::new("edge", None);
        let _engine = EngineBuilder::new(did("did:key:node"), resolver())
            .binding(binding.clone())
            .build()
            .unwrap();

        assert_eq!(binding.handlers.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_binding_names_rejected() {
        let result = EngineBuilder::new(did("did:key:node"), resolver())
            .binding(RecordingBinding::new("edge", None))
            .binding(RecordingBinding::new("edge", None))
            .build();

        assert!(matches!(
            result,
            Err(EngineError::Transport(TransportError::Config(_)))
        ));
    }

    #[tokio::test]
    async fn test_ping_response_leaves_through_origin_binding() {
        let first = RecordingBinding::new("first", None);
        let origin = RecordingBinding::new("origin", None);
        let engine = EngineBuilder::new(did("did:key:b"), resolver())
            .binding(first.clone())
            .binding(origin.clone())
            .build()
            .unwrap();
        engine.start().await.unwrap();

        let ping = ping_from("did:key:a", "did:key:b");
        let ping_id = ping.id();
        let response_id = engine
            .handle_message(ping, Some("origin"))
            .await
            .unwrap()
            .unwrap();

        assert!(first.sent.lock().is_empty());
        let sent = origin.sent.lock();
        let pong = sent[0].header();
        assert_eq!(pong.id, response_id);
        assert_eq!(pong.operation, PONG);
        assert_eq!(pong.in_reply_to, Some(ping_id));
        assert_eq!(pong.source, did("did:key:b"));
        assert_eq!(pong.destination, Some(did("did:key:a")));
    }

    #[tokio::test]
    async fn test_unknown_operation_answers_with_error_reply() {
        let binding = RecordingBinding::new("edge", None);
        let engine = EngineBuilder::new(did("did:key:b"), resolver())
            .binding(binding.clone())
            .build()
            .unwrap();
        engine.start().await.unwrap();

        let header = Header::builder("teleport", did("did:key:a"))
            .destination(did("did:key:b"))
            .expect_response(true)
            .build()
            .unwrap();
        let result = engine
            .handle_message(Message::without_payload(header), Some("edge"))
            .await;

        assert!(matches!(result, Err(EngineError::UnresolvableOperation { .. })));
        let sent = binding.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].operation(), ERROR_OPERATION);
        assert_eq!(sent[0].header().status, Some(404));
        assert!(sent[0].header().property(ERROR_PROPERTY).is_some());
    }

    #[tokio::test]
    async fn test_rejection_without_response_request_sends_nothing() {
        let binding = RecordingBinding::new("edge", None);
        let engine = EngineBuilder::new(did("did:key:b"), resolver())
            .interceptor(Arc::new(Deny))
            .binding(binding.clone())
            .build()
            .unwrap();
        engine.start().await.unwrap();

        let header = Header::builder(PING, did("did:key:a")).build().unwrap();
        let result = engine
            .handle_message(Message::without_payload(header), Some("edge"))
            .await;

        assert!(matches!(result, Err(EngineError::Rejected { .. })));
        assert!(binding.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_routes_to_binding_that_reaches_destination() {
        let west = RecordingBinding::new("west", Some(did("did:key:w")));
        let east = RecordingBinding::new("east", Some(did("did:key:e")));
        let engine = EngineBuilder::new(did("did:key:node"), resolver())
            .binding(west.clone())
            .binding(east.clone())
            .build()
            .unwrap();
        engine.start().await.unwrap();

        let header = Header::builder("update", did("did:key:node"))
            .destination(did("did:key:e"))
            .build()
            .unwrap();
        engine.send(Message::without_payload(header)).await.unwrap();

        assert!(west.sent.lock().is_empty());
        assert_eq!(east.sent_operations(), vec!["update"]);
    }

    #[tokio::test]
    async fn test_no_route_when_bindings_stopped() {
        let binding = RecordingBinding::new("edge", None);
        let engine = EngineBuilder::new(did("did:key:node"), resolver())
            .binding(binding)
            .build()
            .unwrap();

        let header = Header::builder("update", did("did:key:node"))
            .destination(did("did:key:x"))
            .build()
            .unwrap();
        let result = engine.send(Message::without_payload(header)).await;

        assert!(matches!(
            result,
            Err(EngineError::NoRoute { destination }) if destination == "did:key:x"
        ));
        assert!(engine.subscribe(&did("did:key:chan")).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_measures_round_trip() {
        let binding = RecordingBinding::new("edge", None);
        let engine = EngineBuilder::new(did("did:key:a"), resolver())
            .binding(binding.clone())
            .build()
            .unwrap();
        engine.start().await.unwrap();

        engine.probe(&did("did:key:b")).await.unwrap();

        assert_eq!(binding.sent_operations(), vec![PING]);
        assert_eq!(engine.probes().outstanding(), 0);
        assert_eq!(engine.probes().completed(), 1);
    }

    #[tokio::test]
    async fn test_stop_deactivates_bindings() {
        let binding = RecordingBinding::new("edge", None);
        let engine = EngineBuilder::new(did("did:key:a"), resolver())
            .binding(binding.clone())
            .build()
            .unwrap();

        engine.start().await.unwrap();
        assert!(binding.is_active());
        engine.stop().await;
        assert!(!binding.is_active());
        assert!(engine.probe(&did("did:key:b")).await.is_err());
        assert_eq!(engine.probes().outstanding(), 0);
    }
}
