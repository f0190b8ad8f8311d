//! # Sender Identity Resolution
//!
//! Resolves the `source` DID of every inbound message through the caching
//! resolver and records the result on the context.
//!
//! | Outcome       | Annotation                        | Rejected when            |
//! |---------------|-----------------------------------|--------------------------|
//! | active        | none                              | never                    |
//! | deactivated   | `hstp-identity-deactivated: true` | `require_active_source`  |
//! | unresolvable  | `hstp-identity-error: <reason>`   | `require_active_source`  |
//!
//! An unresolvable sender is recorded as a deactivated-shaped document so
//! later stages see a uniform shape.

use crate::chain::{HandlerResult, Interceptor, Next};
use crate::context::MessageContext;
use crate::error::EngineError;
use async_trait::async_trait;
use hstp_identity::CachingDidResolver;
use hstp_types::ResolvedDid;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const IDENTITY_ERROR_PROPERTY: &str = "hstp-identity-error";
pub const IDENTITY_DEACTIVATED_PROPERTY: &str = "hstp-identity-deactivated";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityPolicyConfig {
    /// Reject messages whose sender is deactivated or unresolvable.
    pub require_active_source: bool,
    /// Operations that skip resolution entirely.
    pub exempt_operations: Vec<String>,
}

pub struct IdentityInterceptor {
    resolver: Arc<CachingDidResolver>,
    policy: IdentityPolicyConfig,
}

impl IdentityInterceptor {
    #[must_use]
    pub fn new(resolver: Arc<CachingDidResolver>, policy: IdentityPolicyConfig) -> Self {
        Self { resolver, policy }
    }

    fn is_exempt(&self, operation: &str) -> bool {
        self.policy.exempt_operations.iter().any(|op| op == operation)
    }
}

#[async_trait]
impl Interceptor for IdentityInterceptor {
    fn name(&self) -> &str {
        "identity"
    }

    async fn intercept(&self, ctx: MessageContext, next: Next<'_>) -> HandlerResult {
        if self.is_exempt(ctx.operation()) {
            return next.run(ctx).await;
        }

        let source = ctx.header().source.clone();
        let message_id = ctx.message.id();

        let mut ctx = match self.resolver.try_resolve(&source, false).await {
            Ok(resolved) if resolved.is_deactivated() => {
                if self.policy.require_active_source {
                    warn!(
                        message_id = %message_id,
                        source = %source,
                        "Sender identity is deactivated"
                    );
                    return Err(EngineError::rejected(
                        self.name(),
                        format!("source {source} is deactivated"),
                    ));
                }
                debug!(
                    message_id = %message_id,
                    source = %source,
                    "Sender identity is deactivated"
                );
                let mut ctx = ctx.annotate(IDENTITY_DEACTIVATED_PROPERTY, "true");
                ctx.source_identity = Some(resolved);
                ctx
            }
            Ok(resolved) => {
                let mut ctx = ctx;
                ctx.source_identity = Some(resolved);
                ctx
            }
            Err(e) => {
                if self.policy.require_active_source {
                    warn!(
                        message_id = %message_id,
                        source = %source,
                        error = %e,
                        "Sender identity unresolvable"
                    );
                    return Err(EngineError::rejected(self.name(), e.to_string()));
                }
                debug!(
                    message_id = %message_id,
                    source = %source,
                    error = %e,
                    "Sender identity unresolvable"
                );
                ctx.annotate(IDENTITY_ERROR_PROPERTY, e.to_string())
            }
        };

        if ctx.source_identity.is_none() {
            ctx.source_identity = Some(ResolvedDid::deactivated(source, ctx.received_at));
        }
        next.run(ctx).await
    }
}
