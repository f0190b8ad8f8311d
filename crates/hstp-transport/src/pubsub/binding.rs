use super::broker::{BrokerConnector, BrokerSession, ConnectOptions};
use crate::addressing::{normalize, TopicLayout};
use crate::binding::{InboundHandler, TransportBinding};
use crate::codec;
use crate::config::BindingConfig;
use crate::correlation::{Completion, CorrelationTable};
use crate::error::TransportError;
use crate::registry::BindingFactory;
use crate::PUBSUB_KIND;
use async_trait::async_trait;
use bytes::Bytes;
use hstp_bus::Delivery;
use hstp_types::{Did, Message};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Lifecycle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Shared {
    config: BindingConfig,
    local: Did,
    client_id: String,
    connect_options: ConnectOptions,
    topics: TopicLayout,
    direct_topic: String,
    connector: Arc<dyn BrokerConnector>,
    correlations: Arc<CorrelationTable>,
    handlers: RwLock<Vec<Arc<dyn InboundHandler>>>,
    subscriptions: Mutex<BTreeSet<Did>>,
    /// Serializes subscription changes against (re)connection so no channel
    /// is missed by a resubscribe pass.
    topic_gate: tokio::sync::Mutex<()>,
    session: RwLock<Option<Arc<dyn BrokerSession>>>,
    active: AtomicBool,
    reconnects: AtomicU64,
    lifecycle: tokio::sync::Mutex<Option<Lifecycle>>,
}

impl Shared {
    fn ensure_active(&self) -> Result<(), TransportError> {
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Inactive {
                binding: self.config.name.clone(),
            })
        }
    }

    fn session(&self) -> Option<Arc<dyn BrokerSession>> {
        self.session.read().clone()
    }

    /// Add the binding's configured properties to an outbound header.
    /// Keys the message already carries are left alone.
    fn stamp_properties(&self, message: Message) -> Message {
        if self.config.properties.is_empty() {
            return message;
        }
        let (mut header, payload) = message.into_parts();
        for (key, value) in &self.config.properties {
            header
                .properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Message::new(header, payload)
    }

    fn topics_to_subscribe(&self) -> Vec<String> {
        let mut topics = vec![self.direct_topic.clone(), self.topics.broadcast()];
        topics.extend(
            self.subscriptions
                .lock()
                .iter()
                .map(|channel| self.topics.channel(channel)),
        );
        topics
    }

    /// Connect and (re)subscribe the direct, broadcast and channel topics.
    async fn open(&self) -> Result<mpsc::Receiver<Delivery>, TransportError> {
        let _gate = self.topic_gate.lock().await;

        let connect = self.connector.connect(&self.connect_options);
        let (session, deliveries) = tokio::time::timeout(self.config.connect_timeout(), connect)
            .await
            .map_err(|_| {
                TransportError::Connection(format!(
                    "connect to {} timed out after {:?}",
                    self.config.endpoint,
                    self.config.connect_timeout()
                ))
            })??;
        let session: Arc<dyn BrokerSession> = Arc::from(session);

        for topic in self.topics_to_subscribe() {
            if let Err(e) = session.subscribe(&topic).await {
                session.close().await;
                return Err(e);
            }
        }

        *self.session.write() = Some(session);
        Ok(deliveries)
    }

    async fn publish(&self, topic: &str, frame: Bytes) -> Result<(), TransportError> {
        let session = self.session().ok_or_else(|| {
            TransportError::Connection(format!("binding '{}' is not connected", self.config.name))
        })?;
        session.publish(topic, frame).await.map_err(|e| {
            warn!(binding = %self.config.name, topic, error = %e, "Publish failed");
            e
        })
    }

    /// Decode a delivery, settle correlations, and hand the rest to handlers.
    fn dispatch(&self, delivery: Delivery) {
        let message = match codec::decode_frame(delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    binding = %self.config.name,
                    topic = %delivery.topic,
                    error = %e,
                    "Dropping undecodable frame"
                );
                return;
            }
        };

        // Our own channel and broadcast publications come back to us.
        if message.header().source == self.local && delivery.topic != self.direct_topic {
            debug!(message_id = %message.id(), topic = %delivery.topic, "Ignoring own publication");
            return;
        }

        let message = match self.correlations.complete(message) {
            Completion::Unmatched(message) => message,
            Completion::Fulfilled | Completion::Discarded => return,
        };

        let handlers = self.handlers.read().clone();
        if handlers.is_empty() {
            warn!(
                binding = %self.config.name,
                message_id = %message.id(),
                operation = %message.operation(),
                "No inbound handler registered, message dropped"
            );
            return;
        }

        debug!(
            binding = %self.config.name,
            message_id = %message.id(),
            operation = %message.operation(),
            topic = %delivery.topic,
            "Inbound message"
        );

        let count = handlers.len();
        let mut original = Some(message);
        for (index, handler) in handlers.into_iter().enumerate() {
            let copy = if index + 1 == count {
                original.take()
            } else {
                original.as_ref().and_then(Message::try_clone)
            };
            let Some(copy) = copy else {
                warn!(
                    binding = %self.config.name,
                    "Streaming message cannot be fanned out to every handler"
                );
                continue;
            };
            let binding = self.config.name.clone();
            tokio::spawn(async move {
                handler.on_message(&binding, copy).await;
            });
        }
    }

    /// Retry per the binding's backoff policy until connected, stopped, or
    /// out of attempts.
    async fn reconnect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<mpsc::Receiver<Delivery>> {
        let policy = &self.config.retry;
        let mut attempt = 1;
        while policy.allows(attempt) {
            let delay = policy.delay_for(attempt);
            tokio::select! {
                _ = shutdown.changed() => return None,
                () = tokio::time::sleep(delay) => {}
            }

            self.reconnects.fetch_add(1, Ordering::Relaxed);
            match self.open().await {
                Ok(deliveries) => {
                    info!(
                        binding = %self.config.name,
                        attempt,
                        pending = self.correlations.pending_count(),
                        "Reconnected and resubscribed"
                    );
                    return Some(deliveries);
                }
                Err(e) => {
                    warn!(
                        binding = %self.config.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                }
            }
            attempt = attempt.saturating_add(1);
        }

        error!(
            binding = %self.config.name,
            attempts = attempt - 1,
            "Giving up on reconnection"
        );
        None
    }
}

async fn run(
    shared: Arc<Shared>,
    mut deliveries: mpsc::Receiver<Delivery>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            delivery = deliveries.recv() => match delivery {
                Some(delivery) => shared.dispatch(delivery),
                None => {
                    let lost = shared.session.write().take();
                    drop(lost);
                    warn!(
                        binding = %shared.config.name,
                        pending = shared.correlations.pending_count(),
                        "Connection lost"
                    );
                    match shared.reconnect(&mut shutdown).await {
                        Some(next) => deliveries = next,
                        None => break,
                    }
                }
            }
        }
    }
    debug!(binding = %shared.config.name, "Event loop stopped");
}

/// Pub/sub transport binding over a [`BrokerConnector`].
///
/// On connect it subscribes to its own direct topic, the broadcast topic and
/// every channel in its subscription set; the same happens after each
/// reconnect.
pub struct PubSubBinding {
    shared: Arc<Shared>,
}

impl PubSubBinding {
    /// # Errors
    ///
    /// `TransportError::Config` if `config` does not validate.
    pub fn new(
        config: BindingConfig,
        local: Did,
        connector: Arc<dyn BrokerConnector>,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        let topics = TopicLayout::new(config.topic_prefix.clone());
        let direct_topic = topics.direct(&local);
        let client_id = format!("{}-{}", config.name, normalize(local.as_str()));
        let connect_options = ConnectOptions::from_config(&config, client_id.clone());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                local,
                client_id,
                connect_options,
                topics,
                direct_topic,
                connector,
                correlations: Arc::new(CorrelationTable::new()),
                handlers: RwLock::new(Vec::new()),
                subscriptions: Mutex::new(BTreeSet::new()),
                topic_gate: tokio::sync::Mutex::new(()),
                session: RwLock::new(None),
                active: AtomicBool::new(false),
                reconnects: AtomicU64::new(0),
                lifecycle: tokio::sync::Mutex::new(None),
            }),
        })
    }

    /// Registry constructor for `mqtt` bindings sharing one connector.
    pub fn factory(connector: Arc<dyn BrokerConnector>) -> BindingFactory {
        Arc::new(
            move |config: &BindingConfig,
                  local: &Did|
                  -> Result<Arc<dyn TransportBinding>, TransportError> {
                let binding = Self::new(config.clone(), local.clone(), connector.clone())?;
                Ok(Arc::new(binding))
            },
        )
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    #[must_use]
    pub fn local(&self) -> &Did {
        &self.shared.local
    }

    #[must_use]
    pub fn config(&self) -> &BindingConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn correlations(&self) -> &CorrelationTable {
        &self.shared.correlations
    }

    /// Whether a broker session is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.session.read().is_some()
    }

    /// Reconnect attempts made since construction.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.shared.reconnects.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransportBinding for PubSubBinding {
    fn name(&self) -> &str {
        &self.shared.config.name
    }

    fn kind(&self) -> &str {
        PUBSUB_KIND
    }

    async fn start(&self) -> Result<(), TransportError> {
        let shared = &self.shared;
        let mut lifecycle = shared.lifecycle.lock().await;
        if lifecycle.is_some() {
            debug!(binding = %shared.config.name, "Already started");
            return Ok(());
        }

        let deliveries = shared.open().await?;
        shared.active.store(true, Ordering::SeqCst);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(Arc::clone(shared), deliveries, shutdown_rx));
        *lifecycle = Some(Lifecycle { shutdown, task });

        info!(
            binding = %shared.config.name,
            kind = PUBSUB_KIND,
            endpoint = %shared.config.endpoint,
            client_id = %shared.client_id,
            "Transport binding started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let shared = &self.shared;
        let mut lifecycle = shared.lifecycle.lock().await;
        let Some(Lifecycle { shutdown, task }) = lifecycle.take() else {
            return Ok(());
        };

        shared.active.store(false, Ordering::SeqCst);
        let _ = shutdown.send(true);
        if let Err(e) = task.await {
            warn!(binding = %shared.config.name, error = %e, "Event loop ended abnormally");
        }

        let cancelled = shared.correlations.cancel_all();
        shared.subscriptions.lock().clear();
        let session = shared.session.write().take();
        if let Some(session) = session {
            session.close().await;
        }

        info!(binding = %shared.config.name, cancelled, "Transport binding stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    async fn send(&self, message: Message) -> Result<Option<Message>, TransportError> {
        let shared = &self.shared;
        shared.ensure_active()?;

        let message = shared.stamp_properties(message);
        let id = message.id();
        let operation = message.operation().to_string();
        let expect_response = message.header().expect_response;
        let topic = shared.topics.for_header(message.header());
        let frame = codec::encode_message(message, shared.config.max_payload_bytes).await?;

        let pending = expect_response.then(|| shared.correlations.register(id, &operation));
        // Stopped between the precondition check and registration.
        shared.ensure_active()?;

        shared.publish(&topic, frame).await?;
        debug!(
            binding = %shared.config.name,
            message_id = %id,
            operation = %operation,
            topic = %topic,
            "Message sent"
        );

        match pending {
            Some(pending) => pending
                .wait(shared.config.request_timeout())
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    async fn subscribe(&self, channel: &Did) -> Result<(), TransportError> {
        let shared = &self.shared;
        shared.ensure_active()?;
        let _gate = shared.topic_gate.lock().await;

        let added = shared.subscriptions.lock().insert(channel.clone());
        if !added {
            debug!(binding = %shared.config.name, channel = %channel, "Already subscribed");
            return Ok(());
        }

        let topic = shared.topics.channel(channel);
        match shared.session() {
            Some(session) => {
                if let Err(e) = session.subscribe(&topic).await {
                    warn!(
                        binding = %shared.config.name,
                        topic = %topic,
                        error = %e,
                        "Subscribe deferred until reconnect"
                    );
                }
            }
            None => debug!(topic = %topic, "Not connected, subscribe deferred until reconnect"),
        }

        info!(binding = %shared.config.name, channel = %channel, topic = %topic, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, channel: &Did) -> Result<(), TransportError> {
        let shared = &self.shared;
        shared.ensure_active()?;
        let _gate = shared.topic_gate.lock().await;

        let removed = shared.subscriptions.lock().remove(channel);
        if !removed {
            return Ok(());
        }

        let topic = shared.topics.channel(channel);
        if let Some(session) = shared.session() {
            if let Err(e) = session.unsubscribe(&topic).await {
                warn!(
                    binding = %shared.config.name,
                    topic = %topic,
                    error = %e,
                    "Unsubscribe failed"
                );
            }
        }

        info!(binding = %shared.config.name, channel = %channel, "Unsubscribed");
        Ok(())
    }

    fn subscriptions(&self) -> Vec<Did> {
        self.shared.subscriptions.lock().iter().cloned().collect()
    }

    fn on_receive(&self, handler: Arc<dyn InboundHandler>) {
        self.shared.handlers.write().push(handler);
    }
}

impl Drop for PubSubBinding {
    fn drop(&mut self) {
        if let Ok(mut lifecycle) = self.shared.lifecycle.try_lock() {
            if let Some(lifecycle) = lifecycle.take() {
                let _ = lifecycle.shutdown.send(true);
            }
        }
    }
}
