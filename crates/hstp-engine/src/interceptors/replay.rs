//! Replay guard.

use crate::chain::{HandlerResult, Interceptor, Next};
use crate::context::MessageContext;
use crate::error::EngineError;
use async_trait::async_trait;
use hstp_bus::{ReplayCache, ReplayConfig};
use hstp_types::TimeSource;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Rejects messages whose id was already seen inside the replay window, or
/// whose timestamp falls outside it.
pub struct ReplayInterceptor {
    cache: Mutex<ReplayCache>,
}

impl ReplayInterceptor {
    #[must_use]
    pub fn new(config: &ReplayConfig, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            cache: Mutex::new(ReplayCache::new(config, clock)),
        }
    }

    /// Ids currently remembered.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.cache.lock().len()
    }
}

#[async_trait]
impl Interceptor for ReplayInterceptor {
    fn name(&self) -> &str {
        "replay"
    }

    async fn intercept(&self, ctx: MessageContext, next: Next<'_>) -> HandlerResult {
        let header = ctx.header();
        let checked = self
            .cache
            .lock()
            .check_and_record(header.id, header.timestamp);

        if let Err(e) = checked {
            warn!(
                message_id = %header.id,
                operation = %header.operation,
                source = %header.source,
                error = %e,
                "Rejecting message"
            );
            return Err(EngineError::rejected(self.name(), e.to_string()));
        }
        next.run(ctx).await
    }
}
