//! # Transport Registry
//!
//! Maps a binding `kind` to the constructor that builds it. The node
//! populates the registry at startup from a static list; bindings named in
//! configuration are then created through it.

use crate::binding::TransportBinding;
use crate::config::BindingConfig;
use crate::error::TransportError;
use hstp_types::Did;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builds a binding from its configuration and the local node identity.
pub type BindingFactory = Arc<
    dyn Fn(&BindingConfig, &Did) -> Result<Arc<dyn TransportBinding>, TransportError> + Send + Sync,
>;

#[derive(Default)]
pub struct TransportRegistry {
    factories: RwLock<HashMap<String, BindingFactory>>,
}

impl TransportRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register(&self, kind: impl Into<String>, factory: BindingFactory) {
        let kind = kind.into();
        info!("[Transports] Registering transport kind: {}", kind);
        self.factories.write().insert(kind, factory);
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Build a binding for `config`.
    ///
    /// # Errors
    ///
    /// - `TransportError::UnknownKind` - nothing registered for `config.kind`
    /// - whatever the constructor fails with
    pub fn create(
        &self,
        config: &BindingConfig,
        local: &Did,
    ) -> Result<Arc<dyn TransportBinding>, TransportError> {
        let factory = self
            .factories
            .read()
            .get(&config.kind)
            .cloned()
            .ok_or_else(|| TransportError::UnknownKind(config.kind.clone()))?;

        info!(
            "[Transports] Creating binding '{}' of kind {} ({})",
            config.name, config.kind, config.endpoint
        );
        factory(config, local)
    }
}
