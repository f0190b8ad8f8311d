//! # HSTP Identity - DID Resolution
//!
//! Resolves decentralized identifiers to documents.
//!
//! ## Layers
//!
//! ```text
//! CachingDidResolver (TTL + per-identity single flight, process-wide)
//!        │
//!        ▼
//! DidResolverRegistry (method → resolver, populated at startup)
//!        │
//!        ├── StaticResolver  (local identities, tests)
//!        └── ...             (network-backed resolvers)
//! ```
//!
//! Deactivation is data, not a fault: resolvers return a document whose
//! metadata carries `deactivated = true`. Failures are `IdentityError`s.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cache;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod static_resolver;

pub use cache::{CacheStats, CachingDidResolver, ResolverConfig};
pub use error::IdentityError;
pub use registry::DidResolverRegistry;
pub use resolver::DidResolver;
pub use static_resolver::StaticResolver;
