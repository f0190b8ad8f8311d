//! # Resolver Registry
//!
//! Maps a DID method (`web`, `key`, ...) to the resolver that handles it.
//! Populated explicitly at startup; there is no dynamic discovery.

use crate::error::IdentityError;
use crate::resolver::DidResolver;
use async_trait::async_trait;
use hstp_types::{Did, ResolvedDid};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Default)]
pub struct DidResolverRegistry {
    resolvers: RwLock<HashMap<String, Arc<dyn DidResolver>>>,
}

impl DidResolverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` for `method`, replacing any previous one.
    pub fn register(&self, method: impl Into<String>, resolver: Arc<dyn DidResolver>) {
        let method = method.into();
        info!("[Resolvers] Registering resolver for did:{}", method);
        if self.resolvers.write().insert(method.clone(), resolver).is_some() {
            warn!("[Resolvers] Replaced existing resolver for did:{}", method);
        }
    }

    #[must_use]
    pub fn supports(&self, method: &str) -> bool {
        self.resolvers.read().contains_key(method)
    }

    /// Registered methods, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.resolvers.read().keys().cloned().collect();
        methods.sort();
        methods
    }
}

#[async_trait]
impl DidResolver for DidResolverRegistry {
    async fn resolve(&self, did: &Did) -> Result<ResolvedDid, IdentityError> {
        let resolver = self.resolvers.read().get(did.method()).cloned();
        match resolver {
            Some(resolver) => resolver.resolve(did).await,
            None => Err(IdentityError::UnsupportedMethod {
                method: did.method().to_string(),
            }),
        }
    }
}
