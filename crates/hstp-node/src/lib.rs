//! # HSTP Node Runtime
//!
//! Library half of the `hstp-node` binary, exposed for integration tests.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (`HSTP_CONFIG` TOML file, then environment)
//! 2. Build the identity resolver (static local documents behind the cache)
//! 3. Register transport kinds and create the configured bindings
//! 4. Assemble the interceptor chain and the engine
//! 5. Start every binding

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod wiring;

pub use config::{ConfigError, NodeConfig};
pub use wiring::NodeRuntime;
