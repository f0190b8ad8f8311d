//! # In-Memory Broker
//!
//! Exact-topic fan-out between connected clients. Each client owns a bounded
//! delivery queue; a full queue drops the delivery (at-most-once, like MQTT
//! QoS 0).
//!
//! Connection state is keyed by client id. Reconnecting with the same id
//! replaces the previous session (its queue closes) and starts with no
//! subscriptions, so callers must resubscribe after every connect.

use crate::DEFAULT_CLIENT_QUEUE_CAPACITY;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Errors from broker operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker is not accepting connections or traffic.
    #[error("Broker is unavailable")]
    Unavailable,

    /// The session was severed or replaced.
    #[error("Client '{client_id}' is not connected")]
    Disconnected { client_id: String },

    /// Topic is empty.
    #[error("Topic must not be empty")]
    EmptyTopic,
}

/// A message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Bytes,
}

struct ClientSlot {
    session: u64,
    sender: mpsc::Sender<Delivery>,
}

struct BrokerState {
    clients: RwLock<HashMap<String, ClientSlot>>,
    /// topic -> subscribed client ids
    topics: RwLock<HashMap<String, HashSet<String>>>,
    available: AtomicBool,
    next_session: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    capacity: usize,
}

impl BrokerState {
    fn remove_client(&self, client_id: &str) -> bool {
        let removed = self.clients.write().remove(client_id).is_some();
        let mut topics = self.topics.write();
        for subscribers in topics.values_mut() {
            subscribers.remove(client_id);
        }
        topics.retain(|_, subscribers| !subscribers.is_empty());
        removed
    }

    fn ensure_session(&self, client_id: &str, session: u64) -> Result<(), BrokerError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable);
        }
        match self.clients.read().get(client_id) {
            Some(slot) if slot.session == session => Ok(()),
            _ => Err(BrokerError::Disconnected {
                client_id: client_id.to_string(),
            }),
        }
    }
}

/// Shared in-process broker. Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    /// Create a broker with the default per-client queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CLIENT_QUEUE_CAPACITY)
    }

    /// Create a broker with the given per-client queue capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(BrokerState {
                clients: RwLock::new(HashMap::new()),
                topics: RwLock::new(HashMap::new()),
                available: AtomicBool::new(true),
                next_session: AtomicU64::new(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Open a session for `client_id`.
    ///
    /// An existing session with the same id is replaced.
    ///
    /// # Errors
    ///
    /// `BrokerError::Unavailable` while the broker is marked unavailable.
    pub fn connect(
        &self,
        client_id: impl Into<String>,
    ) -> Result<(BrokerClient, mpsc::Receiver<Delivery>), BrokerError> {
        if !self.state.available.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable);
        }
        let client_id = client_id.into();
        let session = self.state.next_session.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.state.capacity);

        if self.state.remove_client(&client_id) {
            debug!(client_id = %client_id, "Replacing existing broker session");
        }
        self.state
            .clients
            .write()
            .insert(client_id.clone(), ClientSlot { session, sender });

        info!(client_id = %client_id, session, "Broker client connected");

        let client = BrokerClient {
            client_id,
            session,
            state: self.state.clone(),
        };
        Ok((client, receiver))
    }

    /// Sever a client's session. Its delivery queue closes once drained.
    ///
    /// Returns `false` if the client was not connected.
    pub fn disconnect(&self, client_id: &str) -> bool {
        let removed = self.state.remove_client(client_id);
        if removed {
            info!(client_id = %client_id, "Broker client disconnected");
        }
        removed
    }

    /// Mark the broker available or unavailable.
    ///
    /// Going unavailable severs every session and refuses new connections
    /// until the broker is made available again.
    pub fn set_available(&self, available: bool) {
        let was = self.state.available.swap(available, Ordering::SeqCst);
        if was && !available {
            let client_ids: Vec<String> = self.state.clients.read().keys().cloned().collect();
            for client_id in &client_ids {
                self.state.remove_client(client_id);
            }
            warn!(severed = client_ids.len(), "Broker marked unavailable");
        } else if !was && available {
            info!("Broker available again");
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state.available.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.state.clients.read().contains_key(client_id)
    }

    /// Number of clients subscribed to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .topics
            .read()
            .get(topic)
            .map_or(0, HashSet::len)
    }

    /// Total publish calls accepted.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.state.published.load(Ordering::Relaxed)
    }

    /// Deliveries dropped because a subscriber queue was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// One client session on an [`InMemoryBroker`].
///
/// Becomes stale when the broker severs or replaces the session; every
/// operation on a stale session fails with `BrokerError::Disconnected`.
pub struct BrokerClient {
    client_id: String,
    session: u64,
    state: Arc<BrokerState>,
}

impl BrokerClient {
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether this session is still the live one for its client id.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state
            .ensure_session(&self.client_id, self.session)
            .is_ok()
    }

    /// End this session. A stale session is left alone so a newer session
    /// with the same client id survives.
    pub fn close(&self) {
        let live = self
            .state
            .clients
            .read()
            .get(&self.client_id)
            .is_some_and(|slot| slot.session == self.session);
        if live && self.state.remove_client(&self.client_id) {
            info!(client_id = %self.client_id, "Broker client closed session");
        }
    }

    /// Subscribe to an exact topic. Subscribing twice is a no-op.
    pub fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        if topic.is_empty() {
            return Err(BrokerError::EmptyTopic);
        }
        self.state.ensure_session(&self.client_id, self.session)?;
        let added = self
            .state
            .topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .insert(self.client_id.clone());
        if added {
            debug!(client_id = %self.client_id, topic, "Subscribed");
        }
        Ok(())
    }

    /// Remove a subscription. Unsubscribing an unknown topic is a no-op.
    pub fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.state.ensure_session(&self.client_id, self.session)?;
        let mut topics = self.state.topics.write();
        if let Some(subscribers) = topics.get_mut(topic) {
            if subscribers.remove(&self.client_id) {
                debug!(client_id = %self.client_id, topic, "Unsubscribed");
            }
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
        Ok(())
    }

    /// Publish to every current subscriber of `topic`, including this client
    /// if it is subscribed.
    ///
    /// Returns the number of subscribers the payload was queued for.
    pub fn publish(&self, topic: &str, payload: Bytes) -> Result<usize, BrokerError> {
        if topic.is_empty() {
            return Err(BrokerError::EmptyTopic);
        }
        self.state.ensure_session(&self.client_id, self.session)?;
        self.state.published.fetch_add(1, Ordering::Relaxed);

        let senders: Vec<(String, mpsc::Sender<Delivery>)> = {
            let topics = self.state.topics.read();
            let clients = self.state.clients.read();
            topics
                .get(topic)
                .into_iter()
                .flatten()
                .filter_map(|id| clients.get(id).map(|slot| (id.clone(), slot.sender.clone())))
                .collect()
        };

        let mut delivered = 0;
        for (subscriber, sender) in senders {
            let delivery = Delivery {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            match sender.try_send(delivery) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.state.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(subscriber = %subscriber, topic, "Delivery dropped (queue full)");
                }
                Err(TrySendError::Closed(_)) => {
                    self.state.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(subscriber = %subscriber, topic, "Delivery dropped (queue closed)");
                }
            }
        }

        debug!(
            client_id = %self.client_id,
            topic,
            receivers = delivered,
            "Published"
        );
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers_only() {
        let broker = InMemoryBroker::new();
        let (a, mut rx_a) = broker.connect("a").unwrap();
        let (b, mut rx_b) = broker.connect("b").unwrap();

        a.subscribe("hstp/channel/x").unwrap();
        let receivers = b.publish("hstp/channel/x", Bytes::from_static(b"hi")).unwrap();

        assert_eq!(receivers, 1);
        let delivery = rx_a.recv().await.unwrap();
        assert_eq!(delivery.topic, "hstp/channel/x");
        assert_eq!(delivery.payload, Bytes::from_static(b"hi"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let broker = InMemoryBroker::new();
        let (a, mut rx) = broker.connect("a").unwrap();

        a.subscribe("t").unwrap();
        a.subscribe("t").unwrap();
        assert_eq!(broker.subscriber_count("t"), 1);

        assert_eq!(a.publish("t", Bytes::from_static(b"1")).unwrap(), 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());

        a.unsubscribe("t").unwrap();
        a.unsubscribe("t").unwrap();
        assert_eq!(broker.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn test_disconnect_closes_queue_and_stales_client() {
        let broker = InMemoryBroker::new();
        let (a, mut rx) = broker.connect("a").unwrap();
        a.subscribe("t").unwrap();

        assert!(broker.disconnect("a"));
        assert!(rx.recv().await.is_none());
        assert!(!a.is_connected());
        assert!(matches!(
            a.publish("t", Bytes::new()),
            Err(BrokerError::Disconnected { .. })
        ));
        assert_eq!(broker.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session_without_subscriptions() {
        let broker = InMemoryBroker::new();
        let (old, _old_rx) = broker.connect("a").unwrap();
        old.subscribe("t").unwrap();

        let (new, _new_rx) = broker.connect("a").unwrap();
        assert!(!old.is_connected());
        assert!(new.is_connected());
        assert_eq!(broker.subscriber_count("t"), 0);
    }

    #[test]
    fn test_close_ignores_stale_session() {
        let broker = InMemoryBroker::new();
        let (old, _old_rx) = broker.connect("a").unwrap();
        let (new, _new_rx) = broker.connect("a").unwrap();

        old.close();
        assert!(new.is_connected());

        new.close();
        assert!(!broker.is_connected("a"));
    }

    #[test]
    fn test_unavailable_refuses_connections() {
        let broker = InMemoryBroker::new();
        let (a, _rx) = broker.connect("a").unwrap();

        broker.set_available(false);
        assert!(!a.is_connected());
        assert!(matches!(broker.connect("b"), Err(BrokerError::Unavailable)));

        broker.set_available(true);
        assert!(broker.connect("b").is_ok());
    }

    #[test]
    fn test_full_queue_drops_delivery() {
        let broker = InMemoryBroker::with_capacity(1);
        let (a, _rx) = broker.connect("a").unwrap();
        a.subscribe("t").unwrap();

        assert_eq!(a.publish("t", Bytes::from_static(b"1")).unwrap(), 1);
        assert_eq!(a.publish("t", Bytes::from_static(b"2")).unwrap(), 0);
        assert_eq!(broker.dropped(), 1);
        assert_eq!(broker.published(), 2);
    }
}
