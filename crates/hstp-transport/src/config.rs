//! # Binding Configuration
//!
//! Plain structured values; loading them from files or the environment is
//! the node runtime's job.

use crate::error::TransportError;
use crate::PUBSUB_KIND;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Reconnection backoff.
///
/// Delay before attempt `n` (1-based) is `base * multiplier^(n-1)`, capped
/// at `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before giving up; 0 retries forever.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay_ms = (self.base_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether the given 1-based attempt may run.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub ca_file: Option<String>,
    pub verify_peer: bool,
}

/// One transport binding instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Unique within a node.
    pub name: String,
    /// Selects the constructor in the transport registry.
    pub kind: String,
    /// Broker address or endpoint URL.
    pub endpoint: String,
    pub topic_prefix: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_connections: usize,
    pub max_payload_bytes: usize,
    pub tls: TlsConfig,
    pub retry: RetryPolicy,
    /// Custom headers/properties passed through to the transport.
    pub properties: BTreeMap<String, String>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            name: "mqtt".to_string(),
            kind: PUBSUB_KIND.to_string(),
            endpoint: "memory://local".to_string(),
            topic_prefix: "hstp".to_string(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            max_connections: 1,
            max_payload_bytes: 1024 * 1024,
            tls: TlsConfig::default(),
            retry: RetryPolicy::default(),
            properties: BTreeMap::new(),
        }
    }
}

impl BindingConfig {
    /// A default configuration under a different name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// # Errors
    ///
    /// `TransportError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), TransportError> {
        let invalid =
            |reason: &str| Err(TransportError::Config(format!("{}: {reason}", self.name)));

        if self.name.trim().is_empty() {
            return Err(TransportError::Config("binding name is empty".to_string()));
        }
        if self.kind.trim().is_empty() {
            return invalid("kind is empty");
        }
        if self.request_timeout_ms == 0 {
            return invalid("request_timeout_ms must be > 0");
        }
        if self.connect_timeout_ms == 0 {
            return invalid("connect_timeout_ms must be > 0");
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be > 0");
        }
        if self.max_payload_bytes == 0 {
            return invalid("max_payload_bytes must be > 0");
        }
        if self.topic_prefix.is_empty() || self.topic_prefix.contains(['+', '#']) {
            return invalid("topic_prefix must be non-empty and free of wildcards");
        }
        if self.retry.multiplier < 1.0 || self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry policy must not shrink and base delay must not exceed max delay");
        }
        Ok(())
    }
}
