//! # Time-Bounded Replay Cache
//!
//! Rejects messages whose id has been seen before, or whose timestamp falls
//! outside `[now - max_age, now + max_future_skew]`.
//!
//! - Ids are retained for `retention` (at least twice the age window)
//! - Expired ids are garbage-collected every `gc_interval`
//! - Memory is therefore bounded by the message rate within `retention`

use hstp_types::{MessageId, TimeSource, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from replay checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The message id has already been seen.
    #[error("Message {id} has already been seen (replay)")]
    Replayed { id: MessageId },

    /// The message timestamp is too old.
    #[error("Message timestamp {timestamp} is too old (threshold: {threshold})")]
    TooOld {
        timestamp: Timestamp,
        threshold: Timestamp,
    },

    /// The message timestamp is in the future.
    #[error("Message timestamp {timestamp} is in the future (threshold: {threshold})")]
    FromFuture {
        timestamp: Timestamp,
        threshold: Timestamp,
    },
}

/// Replay window settings, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub enabled: bool,
    pub max_age_secs: u64,
    pub max_future_skew_secs: u64,
    pub retention_secs: u64,
    pub gc_interval_secs: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: 60,
            max_future_skew_secs: 10,
            retention_secs: 120,
            gc_interval_secs: 10,
        }
    }
}

/// Cache of recently seen message ids.
pub struct ReplayCache {
    /// id -> message timestamp
    seen: HashMap<MessageId, Timestamp>,
    max_age: Duration,
    max_future_skew: Duration,
    retention: Duration,
    gc_interval: Duration,
    last_gc: Timestamp,
    clock: Arc<dyn TimeSource>,
}

impl ReplayCache {
    /// Create a cache with the given window and clock.
    #[must_use]
    pub fn new(config: &ReplayConfig, clock: Arc<dyn TimeSource>) -> Self {
        let max_age = Duration::from_secs(config.max_age_secs);
        Self {
            seen: HashMap::new(),
            max_age,
            max_future_skew: Duration::from_secs(config.max_future_skew_secs),
            retention: Duration::from_secs(config.retention_secs).max(max_age * 2),
            gc_interval: Duration::from_secs(config.gc_interval_secs),
            last_gc: clock.now(),
            clock,
        }
    }

    /// Validate the timestamp and record the id.
    ///
    /// The timestamp is checked first so out-of-window messages never grow
    /// the cache.
    ///
    /// # Errors
    ///
    /// - `ReplayError::TooOld` - timestamp older than `max_age`
    /// - `ReplayError::FromFuture` - timestamp beyond `max_future_skew`
    /// - `ReplayError::Replayed` - id already recorded
    pub fn check_and_record(
        &mut self,
        id: MessageId,
        timestamp: Timestamp,
    ) -> Result<(), ReplayError> {
        let now = self.clock.now();

        let oldest = now.saturating_sub(self.max_age);
        let newest = now.saturating_add(self.max_future_skew);
        if timestamp < oldest {
            return Err(ReplayError::TooOld {
                timestamp,
                threshold: oldest,
            });
        }
        if timestamp > newest {
            return Err(ReplayError::FromFuture {
                timestamp,
                threshold: newest,
            });
        }

        if now.duration_since(self.last_gc) > self.gc_interval {
            self.garbage_collect(now);
            self.last_gc = now;
        }

        if self.seen.contains_key(&id) {
            return Err(ReplayError::Replayed { id });
        }
        self.seen.insert(id, timestamp);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn garbage_collect(&mut self, now: Timestamp) {
        let threshold = now.saturating_sub(self.retention);
        let before = self.seen.len();
        self.seen.retain(|_, ts| *ts > threshold);
        let removed = before - self.seen.len();
        if removed > 0 {
            debug!(removed, remaining = self.seen.len(), "Replay cache collected");
        }
    }
}
