//! Credential check on the `authorization` header property.

use crate::chain::{HandlerResult, Interceptor, Next};
use crate::context::MessageContext;
use crate::error::EngineError;
use crate::handlers::{PING, PONG};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

pub const AUTHORIZATION_PROPERTY: &str = "authorization";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub enabled: bool,
    /// Operations that need no credential.
    pub public_operations: Vec<String>,
    /// Accepted bearer tokens for [`StaticTokenVerifier`].
    pub tokens: Vec<String>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            public_operations: vec![PING.to_string(), PONG.to_string()],
            tokens: Vec::new(),
        }
    }
}

/// Decides whether a credential is acceptable.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// # Errors
    ///
    /// The reason the credential was refused.
    async fn verify(&self, credential: &str) -> Result<(), String>;
}

/// Accepts a fixed set of tokens, with or without a `Bearer ` prefix.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashSet<String>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CredentialVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<(), String> {
        let token = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();
        if self.tokens.contains(token) {
            Ok(())
        } else {
            Err("unknown token".to_string())
        }
    }
}

pub struct AuthorizationInterceptor {
    verifier: Arc<dyn CredentialVerifier>,
    public_operations: HashSet<String>,
}

impl AuthorizationInterceptor {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, config: &AuthorizationConfig) -> Self {
        Self {
            verifier,
            public_operations: config.public_operations.iter().cloned().collect(),
        }
    }
}

#[async_trait]
impl Interceptor for AuthorizationInterceptor {
    fn name(&self) -> &str {
        "authorization"
    }

    async fn intercept(&self, ctx: MessageContext, next: Next<'_>) -> HandlerResult {
        if self.public_operations.contains(ctx.operation()) {
            return next.run(ctx).await;
        }

        let header = ctx.header();
        let verdict = match header.property(AUTHORIZATION_PROPERTY) {
            Some(credential) => self.verifier.verify(credential).await,
            None => Err("missing credential".to_string()),
        };

        if let Err(reason) = verdict {
            warn!(
                message_id = %header.id,
                operation = %header.operation,
                source = %header.source,
                reason = %reason,
                "Authorization failed"
            );
            return Err(EngineError::rejected(self.name(), reason));
        }
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{InterceptorChain, Terminal};
    use hstp_types::{Did, Header, Message};

    struct Accept;

    #[async_trait]
    impl Terminal for Accept {
        async fn dispatch(&self, _ctx: MessageContext) -> HandlerResult {
            Ok(None)
        }
    }

    fn chain() -> InterceptorChain {
        let config = AuthorizationConfig {
            enabled: true,
            tokens: vec!["s3cret".to_string()],
            ..AuthorizationConfig::default()
        };
        let verifier = Arc::new(StaticTokenVerifier::new(config.tokens.clone()));
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(AuthorizationInterceptor::new(verifier, &config)));
        chain
    }

    fn context(operation: &str, credential: Option<&str>) -> MessageContext {
        let mut builder = Header::builder(operation, Did::parse("did:key:peer").unwrap());
        if let Some(credential) = credential {
            builder = builder.property(AUTHORIZATION_PROPERTY, credential);
        }
        MessageContext::new(
            Message::without_payload(builder.build().unwrap()),
            Did::parse("did:key:local").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_valid_credential_passes() {
        let chain = chain();
        assert!(chain
            .process(context("update", Some("Bearer s3cret")), &Accept)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_or_bad_credential_is_rejected() {
        let chain = chain();

        let missing = chain.process(context("update", None), &Accept).await;
        let bad = chain
            .process(context("update", Some("Bearer nope")), &Accept)
            .await;

        assert!(matches!(
            missing,
            Err(EngineError::Rejected { reason, .. }) if reason == "missing credential"
        ));
        assert!(matches!(bad, Err(EngineError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_public_operations_skip_verification() {
        let chain = chain();
        assert!(chain.process(context(PING, None), &Accept).await.is_ok());
    }
}
