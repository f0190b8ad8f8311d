//! Per-message span and outcome logging.

use crate::chain::{HandlerResult, Interceptor, Next};
use crate::context::MessageContext;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument, Span};

/// Opens an `hstp_message` span and instruments the rest of the chain with
/// it. Errors are logged and re-raised unchanged.
#[derive(Debug, Default, Clone)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    async fn intercept(&self, ctx: MessageContext, next: Next<'_>) -> HandlerResult {
        let message_id = ctx.message.id();
        let operation = ctx.operation().to_string();
        let span = info_span!(
            "hstp_message",
            message_id = %message_id,
            operation = %operation,
            source = %ctx.header().source,
            binding = ctx.binding.as_deref().unwrap_or("local"),
            outcome = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        );
        let started = Instant::now();

        async move {
            let result = next.run(ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let span = Span::current();
            span.record("elapsed_ms", elapsed_ms);
            match &result {
                Ok(Some(response)) => {
                    span.record("outcome", "response");
                    debug!(
                        message_id = %message_id,
                        operation = %operation,
                        response_id = %response.id(),
                        elapsed_ms,
                        "Message handled"
                    );
                }
                Ok(None) => {
                    span.record("outcome", "ok");
                    debug!(
                        message_id = %message_id,
                        operation = %operation,
                        elapsed_ms,
                        "Message handled"
                    );
                }
                Err(e) => {
                    span.record("outcome", "error");
                    warn!(
                        message_id = %message_id,
                        operation = %operation,
                        error = %e,
                        elapsed_ms,
                        "Message processing failed"
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }
}
