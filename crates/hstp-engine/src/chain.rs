//! # Interceptor Chain
//!
//! An ordered list of interceptors plus an index-based dispatcher. Given
//! index `n`, [`Next::run`] invokes interceptor `n` with a continuation
//! bound to `n + 1`; past the end it invokes the terminal dispatch.
//!
//! ```text
//! A enter → B enter → terminal → B exit → A exit
//! ```
//!
//! Errors unwind through every interceptor that wrapped the call, so an
//! outer interceptor observes failures of everything inside it.

use crate::context::MessageContext;
use crate::error::EngineError;
use async_trait::async_trait;
use hstp_types::Message;
use std::sync::Arc;

/// Outcome of processing one message: an optional response to route back.
pub type HandlerResult = Result<Option<Message>, EngineError>;

/// A cross-cutting message processor.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    /// Process `ctx`. Call `next.run(ctx)` to continue the chain; return
    /// without calling it to end processing here.
    async fn intercept(&self, ctx: MessageContext, next: Next<'_>) -> HandlerResult;
}

/// The stage after the last interceptor.
#[async_trait]
pub trait Terminal: Send + Sync {
    async fn dispatch(&self, ctx: MessageContext) -> HandlerResult;
}

/// Continuation over the remainder of the chain.
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    index: usize,
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    /// Invoke the remainder of the chain.
    pub async fn run(self, ctx: MessageContext) -> HandlerResult {
        match self.interceptors.get(self.index) {
            Some(interceptor) => {
                let rest = Next {
                    interceptors: self.interceptors,
                    index: self.index + 1,
                    terminal: self.terminal,
                };
                interceptor.intercept(ctx, rest).await
            }
            None => self.terminal.dispatch(ctx).await,
        }
    }

    /// Interceptors still to run before the terminal stage.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.interceptors.len().saturating_sub(self.index)
    }
}

/// Interceptors in registration order. Built once, before the engine starts.
#[derive(Default, Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Interceptor names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.interceptors
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    /// Run `ctx` through every interceptor and then `terminal`.
    pub async fn process(&self, ctx: MessageContext, terminal: &dyn Terminal) -> HandlerResult {
        Next {
            interceptors: &self.interceptors,
            index: 0,
            terminal,
        }
        .run(ctx)
        .await
    }
}
