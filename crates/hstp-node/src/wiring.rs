//! # Node Wiring
//!
//! Builds every component from a [`NodeConfig`] and owns them for the life
//! of the node.
//!
//! ```text
//! StaticResolver ─▶ DidResolverRegistry ─▶ CachingDidResolver
//!                                                 │
//! TransportRegistry ─▶ bindings ─────────────▶ EngineBuilder ─▶ Engine
//!                                                 ▲
//!          logging → replay → identity → authorization
//! ```

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use hstp_bus::InMemoryBroker;
use hstp_engine::{
    AuthorizationInterceptor, Engine, EngineBuilder, IdentityInterceptor, LoggingInterceptor,
    OperationHandler, ReplayInterceptor, StaticTokenVerifier,
};
use hstp_identity::{CachingDidResolver, DidResolverRegistry, StaticResolver};
use hstp_transport::{PubSubBinding, TransportRegistry, PUBSUB_KIND};
use hstp_types::{Did, SystemTimeSource, TimeSource};
use std::sync::Arc;
use tracing::info;

/// A running (or ready to run) node.
pub struct NodeRuntime {
    config: NodeConfig,
    local: Did,
    broker: InMemoryBroker,
    documents: Arc<StaticResolver>,
    transports: TransportRegistry,
    engine: Arc<Engine>,
}

impl NodeRuntime {
    /// Build a node with its own in-process broker.
    ///
    /// # Errors
    ///
    /// Invalid configuration or a binding that cannot be created.
    pub fn new(config: NodeConfig) -> Result<Self> {
        Self::with_broker(config, InMemoryBroker::new())
    }

    /// Build a node attached to `broker`, which may be shared with other
    /// nodes in the same process.
    ///
    /// # Errors
    ///
    /// As for [`new`](Self::new).
    pub fn with_broker(config: NodeConfig, broker: InMemoryBroker) -> Result<Self> {
        Self::with_handlers(config, broker, Vec::new())
    }

    /// Build a node attached to `broker` with extra operation handlers.
    ///
    /// # Errors
    ///
    /// As for [`new`](Self::new).
    pub fn with_handlers(
        config: NodeConfig,
        broker: InMemoryBroker,
        handlers: Vec<(String, Arc<dyn OperationHandler>)>,
    ) -> Result<Self> {
        config.validate().context("Invalid node configuration")?;
        let local = config.local_did()?;
        let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());

        // Identity resolution
        let documents = Arc::new(StaticResolver::new(clock.clone()));
        let resolvers = DidResolverRegistry::new();
        for did in std::iter::once(local.clone()).chain(config.known_dids()?) {
            if !resolvers.supports(did.method()) {
                resolvers.register(did.method(), documents.clone());
            }
            documents.insert_identity(did);
        }
        let resolver = Arc::new(CachingDidResolver::new(
            Arc::new(resolvers),
            &config.resolver,
        ));

        // Transports
        let transports = TransportRegistry::new();
        transports.register(
            PUBSUB_KIND,
            PubSubBinding::factory(Arc::new(broker.clone())),
        );

        // Interceptor chain and engine
        let mut builder = EngineBuilder::new(local.clone(), resolver.clone())
            .interceptor(Arc::new(LoggingInterceptor::new()));
        if config.replay.enabled {
            builder = builder.interceptor(Arc::new(ReplayInterceptor::new(
                &config.replay,
                clock.clone(),
            )));
        }
        builder = builder.interceptor(Arc::new(IdentityInterceptor::new(
            resolver,
            config.identity_policy.clone(),
        )));
        if config.authorization.enabled {
            let verifier = StaticTokenVerifier::new(config.authorization.tokens.clone());
            builder = builder.interceptor(Arc::new(AuthorizationInterceptor::new(
                Arc::new(verifier),
                &config.authorization,
            )));
        }
        for (operation, handler) in handlers {
            builder = builder.operation(operation, handler);
        }
        for binding_config in &config.bindings {
            let binding = transports
                .create(binding_config, &local)
                .with_context(|| format!("Failed to create binding '{}'", binding_config.name))?;
            builder = builder.binding(binding);
        }
        let engine = builder.build().context("Failed to assemble engine")?;

        Ok(Self {
            config,
            local,
            broker,
            documents,
            transports,
            engine,
        })
    }

    /// Start every binding.
    ///
    /// # Errors
    ///
    /// The first binding that fails to start.
    pub async fn start(&self) -> Result<()> {
        info!("===========================================");
        info!("  HSTP Node v{}", env!("CARGO_PKG_VERSION"));
        info!("  Identity: {}", self.local);
        info!("===========================================");

        self.engine
            .start()
            .await
            .context("Failed to start transport bindings")?;

        for binding in self.engine.bindings() {
            info!("Binding '{}' ({}) active", binding.name(), binding.kind());
        }
        info!(
            "Node ready, interceptors: {:?}, transport kinds: {:?}",
            self.engine.interceptors(),
            self.transports.kinds()
        );
        Ok(())
    }

    /// Stop every binding, cancelling their pending requests.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.engine.stop().await;
        info!("Shutdown complete");
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    #[must_use]
    pub fn local(&self) -> &Did {
        &self.local
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Documents served for local and known identities.
    #[must_use]
    pub fn documents(&self) -> &Arc<StaticResolver> {
        &self.documents
    }

    #[must_use]
    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }
}
