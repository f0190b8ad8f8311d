//! # Liveness Probes
//!
//! `ping` asks a peer to answer with `pong`. A ping that expects a response
//! gets one; a ping that does not is only logged.
//!
//! Round-trip times are measured by [`ProbeTracker`]: the engine records the
//! send time of every probe, and whichever side sees the pong first (the
//! waiting caller or the pong handler) settles it.

use crate::chain::HandlerResult;
use crate::context::MessageContext;
use crate::operation::OperationHandler;
use async_trait::async_trait;
use dashmap::DashMap;
use hstp_types::{Message, MessageId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Probes older than this are forgotten once the tracker is full.
const PROBE_RETENTION: Duration = Duration::from_secs(300);
const MAX_TRACKED_PROBES: usize = 1024;

/// Send times of outstanding probes.
#[derive(Default)]
pub struct ProbeTracker {
    outstanding: DashMap<MessageId, Instant>,
    last_rtt: Mutex<Option<Duration>>,
    completed: AtomicU64,
}

impl ProbeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that probe `id` was sent now.
    pub fn start(&self, id: MessageId) {
        if self.outstanding.len() >= MAX_TRACKED_PROBES {
            let now = Instant::now();
            self.outstanding
                .retain(|_, sent| now.duration_since(*sent) < PROBE_RETENTION);
        }
        self.outstanding.insert(id, Instant::now());
    }

    /// Settle probe `id`, returning its round-trip time if it was tracked.
    pub fn finish(&self, id: &MessageId) -> Option<Duration> {
        let (_, sent) = self.outstanding.remove(id)?;
        let rtt = sent.elapsed();
        *self.last_rtt.lock() = Some(rtt);
        self.completed.fetch_add(1, Ordering::Relaxed);
        Some(rtt)
    }

    /// Stop tracking probe `id` without recording a round trip.
    pub fn forget(&self, id: &MessageId) {
        self.outstanding.remove(id);
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    #[must_use]
    pub fn last_rtt(&self) -> Option<Duration> {
        *self.last_rtt.lock()
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Answers `ping` with `pong` when a response is expected.
#[derive(Debug, Default)]
pub struct PingHandler;

#[async_trait]
impl OperationHandler for PingHandler {
    async fn handle(&self, ctx: MessageContext) -> HandlerResult {
        if !ctx.header().expect_response {
            debug!(
                message_id = %ctx.message.id(),
                source = %ctx.header().source,
                "Ping without response request"
            );
            return Ok(None);
        }
        let header = ctx.reply(PONG).build()?;
        Ok(Some(Message::without_payload(header)))
    }
}

/// Records round trips for pongs that were not consumed by a waiting caller.
pub struct PongHandler {
    tracker: Arc<ProbeTracker>,
}

impl PongHandler {
    #[must_use]
    pub fn new(tracker: Arc<ProbeTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl OperationHandler for PongHandler {
    async fn handle(&self, ctx: MessageContext) -> HandlerResult {
        let header = ctx.header();
        match header.in_reply_to.and_then(|id| self.tracker.finish(&id)) {
            Some(rtt) => debug!(
                message_id = %header.id,
                source = %header.source,
                rtt_ms = rtt.as_millis() as u64,
                "Pong received"
            ),
            None => debug!(
                message_id = %header.id,
                source = %header.source,
                "Pong for an untracked probe"
            ),
        }
        Ok(None)
    }
}
