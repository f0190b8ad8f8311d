//! # HSTP Engine
//!
//! The single place inbound messages enter and outbound responses leave.
//!
//! ```text
//! binding ──on_message──▶ Engine::handle_message
//!                              │
//!                              ▼
//!             [interceptor 0] → [interceptor 1] → … → OperationRegistry
//!                                                          │
//!                                                          ▼
//!                                                   OperationHandler
//!                                                          │ response?
//!                              ◀───── send_response ───────┘
//! ```
//!
//! Interceptors run in registration order on the way in and unwind in
//! reverse on the way out. An interceptor that does not call `next` ends
//! the chain without dispatching.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod chain;
pub mod context;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod interceptors;
pub mod operation;

pub use chain::{HandlerResult, Interceptor, InterceptorChain, Next, Terminal};
pub use context::MessageContext;
pub use engine::{Engine, EngineBuilder, ERROR_OPERATION, ERROR_PROPERTY};
pub use error::EngineError;
pub use handlers::{PingHandler, PongHandler, ProbeTracker, PING, PONG};
pub use interceptors::{
    AuthorizationConfig, AuthorizationInterceptor, CredentialVerifier, IdentityInterceptor,
    IdentityPolicyConfig, LoggingInterceptor, ReplayInterceptor, StaticTokenVerifier,
    AUTHORIZATION_PROPERTY, IDENTITY_DEACTIVATED_PROPERTY, IDENTITY_ERROR_PROPERTY,
};
pub use operation::{OperationHandler, OperationRegistry};
