//! Built-in interceptors.
//!
//! The node installs them in this order when enabled:
//!
//! 1. [`LoggingInterceptor`] - span per message, outcome and timing
//! 2. [`ReplayInterceptor`] - duplicate ids and stale timestamps
//! 3. [`IdentityInterceptor`] - resolves the sender's DID
//! 4. [`AuthorizationInterceptor`] - checks the credential header

pub mod authorization;
pub mod identity;
pub mod logging;
pub mod replay;

pub use authorization::{
    AuthorizationConfig, AuthorizationInterceptor, CredentialVerifier, StaticTokenVerifier,
    AUTHORIZATION_PROPERTY,
};
pub use identity::{
    IdentityInterceptor, IdentityPolicyConfig, IDENTITY_DEACTIVATED_PROPERTY,
    IDENTITY_ERROR_PROPERTY,
};
pub use logging::LoggingInterceptor;
pub use replay::ReplayInterceptor;
