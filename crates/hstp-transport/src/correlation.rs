//! # Correlation Table
//!
//! Matches inbound responses to outstanding requests by `inReplyTo`.
//!
//! Each pending entry is settled exactly once, by whichever comes first:
//!
//! 1. a matching response (`complete`)
//! 2. the caller's timeout (`PendingResponse::wait`)
//! 3. the caller being dropped (`PendingResponse` drop guard)
//! 4. the binding stopping (`cancel_all`)
//!
//! Settled ids are remembered in a bounded FIFO so a late or duplicate
//! response is recognised and discarded instead of being treated as a new
//! inbound message.

use crate::error::TransportError;
use dashmap::DashMap;
use hstp_types::{Message, MessageId};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Settled ids remembered for duplicate detection.
pub const DEFAULT_SETTLED_CAPACITY: usize = 4096;

enum Outcome {
    Response(Message),
    Cancelled,
}

struct Pending {
    sender: oneshot::Sender<Outcome>,
    created_at: Instant,
    operation: String,
}

/// Result of offering an inbound message to the table.
#[derive(Debug)]
pub enum Completion {
    /// The message fulfilled a pending request.
    Fulfilled,
    /// The message answered a request that was already settled; dropped.
    Discarded,
    /// The message is not a response to anything this table tracks.
    Unmatched(Message),
}

/// Correlation counters.
#[derive(Debug, Default)]
pub struct CorrelationStats {
    pub registered: AtomicU64,
    pub completed: AtomicU64,
    pub timeouts: AtomicU64,
    pub cancelled: AtomicU64,
    /// Late or duplicate responses dropped.
    pub discarded: AtomicU64,
}

struct SettledIds {
    order: VecDeque<MessageId>,
    ids: HashSet<MessageId>,
    capacity: usize,
}

impl SettledIds {
    fn insert(&mut self, id: MessageId) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

/// Per-binding table of requests awaiting a response.
pub struct CorrelationTable {
    pending: DashMap<MessageId, Pending>,
    settled: Mutex<SettledIds>,
    stats: CorrelationStats,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settled_capacity(DEFAULT_SETTLED_CAPACITY)
    }

    #[must_use]
    pub fn with_settled_capacity(capacity: usize) -> Self {
        Self {
            pending: DashMap::new(),
            settled: Mutex::new(SettledIds {
                order: VecDeque::new(),
                ids: HashSet::new(),
                capacity: capacity.max(1),
            }),
            stats: CorrelationStats::default(),
        }
    }

    /// Create a pending correlation for request `id`.
    ///
    /// Register before the request leaves the node so a fast response
    /// cannot overtake the registration.
    pub fn register(self: &Arc<Self>, id: MessageId, operation: &str) -> PendingResponse {
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(
            id,
            Pending {
                sender,
                created_at: Instant::now(),
                operation: operation.to_string(),
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        debug!(message_id = %id, operation, "Registered pending correlation");

        PendingResponse {
            id,
            receiver,
            table: Arc::clone(self),
            settled: false,
        }
    }

    /// Offer an inbound message. Responses to pending requests are consumed.
    pub fn complete(&self, message: Message) -> Completion {
        let Some(request_id) = message.header().in_reply_to else {
            return Completion::Unmatched(message);
        };

        if let Some((_, pending)) = self.pending.remove(&request_id) {
            self.mark_settled(request_id);
            let elapsed = pending.created_at.elapsed();
            let response_id = message.id();
            return match pending.sender.send(Outcome::Response(message)) {
                Ok(()) => {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        message_id = %request_id,
                        operation = %pending.operation,
                        response_id = %response_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Correlation fulfilled"
                    );
                    Completion::Fulfilled
                }
                Err(_) => {
                    self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        message_id = %request_id,
                        operation = %pending.operation,
                        "Response arrived after caller went away, discarded"
                    );
                    Completion::Discarded
                }
            };
        }

        if self.settled.lock().ids.contains(&request_id) {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            warn!(
                message_id = %request_id,
                response_id = %message.id(),
                operation = %message.operation(),
                "Late or duplicate response discarded"
            );
            return Completion::Discarded;
        }

        Completion::Unmatched(message)
    }

    /// Settle every pending correlation as cancelled.
    ///
    /// Returns the number cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<MessageId> = self.pending.iter().map(|e| *e.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                self.mark_settled(id);
                let _ = pending.sender.send(Outcome::Cancelled);
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(cancelled, "Cancelled pending correlations");
        }
        cancelled
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, id: &MessageId) -> bool {
        self.pending.contains_key(id)
    }

    #[must_use]
    pub fn stats(&self) -> &CorrelationStats {
        &self.stats
    }

    fn mark_settled(&self, id: MessageId) {
        self.settled.lock().insert(id);
    }

    /// Remove `id` if still pending. Returns whether this call settled it.
    fn settle(&self, id: MessageId) -> bool {
        let removed = self.pending.remove(&id).is_some();
        if removed {
            self.mark_settled(id);
        }
        removed
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle held by the caller awaiting a response.
///
/// Dropping it before it settles removes the pending entry immediately.
pub struct PendingResponse {
    id: MessageId,
    receiver: oneshot::Receiver<Outcome>,
    table: Arc<CorrelationTable>,
    settled: bool,
}

impl PendingResponse {
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Wait for the response or the timeout, whichever comes first.
    ///
    /// # Errors
    ///
    /// - `TransportError::Timeout` - nothing arrived within `timeout`
    /// - `TransportError::Cancelled` - the table was cancelled
    pub async fn wait(mut self, timeout: Duration) -> Result<Message, TransportError> {
        let id = self.id;
        let outcome = match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(outcome) => outcome.ok(),
            Err(_) => {
                if self.table.settle(id) {
                    self.settled = true;
                    self.table.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        message_id = %id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Correlation timed out"
                    );
                    return Err(TransportError::Timeout { id, timeout });
                }
                // Settled concurrently with the deadline; take that outcome.
                self.receiver.try_recv().ok()
            }
        };
        self.settled = true;

        match outcome {
            Some(Outcome::Response(message)) => Ok(message),
            Some(Outcome::Cancelled) | None => Err(TransportError::Cancelled { id }),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.settled && self.table.settle(self.id) {
            self.table.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(message_id = %self.id, "Pending correlation abandoned by caller");
        }
    }
}
