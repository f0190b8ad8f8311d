//! # Node Configuration
//!
//! Defaults, then an optional TOML file named by `HSTP_CONFIG`, then
//! environment overrides:
//!
//! | Variable                  | Field                                |
//! |---------------------------|--------------------------------------|
//! | `HSTP_IDENTITY`           | `identity`                           |
//! | `HSTP_RESOLVER_TTL_SECS`  | `resolver.ttl_secs`                  |
//! | `HSTP_REQUEST_TIMEOUT_MS` | `request_timeout_ms` of every binding |

use hstp_bus::ReplayConfig;
use hstp_engine::{AuthorizationConfig, IdentityPolicyConfig};
use hstp_identity::ResolverConfig;
use hstp_transport::{BindingConfig, TransportError};
use hstp_types::{Did, DidError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const CONFIG_PATH_ENV: &str = "HSTP_CONFIG";
pub const IDENTITY_ENV: &str = "HSTP_IDENTITY";
pub const RESOLVER_TTL_ENV: &str = "HSTP_RESOLVER_TTL_SECS";
pub const REQUEST_TIMEOUT_ENV: &str = "HSTP_REQUEST_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid identity '{value}': {source}")]
    InvalidIdentity { value: String, source: DidError },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid binding configuration: {0}")]
    Binding(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

impl From<TransportError> for ConfigError {
    fn from(e: TransportError) -> Self {
        Self::Binding(e.to_string())
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's DID.
    pub identity: String,
    /// Other identities served by the local static resolver.
    pub known_identities: Vec<String>,
    pub resolver: ResolverConfig,
    pub bindings: Vec<BindingConfig>,
    pub replay: ReplayConfig,
    pub authorization: AuthorizationConfig,
    pub identity_policy: IdentityPolicyConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: "did:key:hstp-node".to_string(),
            known_identities: Vec::new(),
            resolver: ResolverConfig::default(),
            bindings: vec![BindingConfig::default()],
            replay: ReplayConfig::default(),
            authorization: AuthorizationConfig::default(),
            identity_policy: IdentityPolicyConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from `HSTP_CONFIG` (if set) and the process environment, then
    /// validate.
    ///
    /// # Errors
    ///
    /// Unreadable or malformed file, malformed overrides, or a failed
    /// [`validate`](Self::validate).
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidEnv` for a value that does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(identity) = lookup(IDENTITY_ENV) {
            self.identity = identity;
        }
        if let Some(value) = lookup(RESOLVER_TTL_ENV) {
            self.resolver.ttl_secs = parse_env(RESOLVER_TTL_ENV, value)?;
        }
        if let Some(value) = lookup(REQUEST_TIMEOUT_ENV) {
            let timeout = parse_env(REQUEST_TIMEOUT_ENV, value)?;
            for binding in &mut self.bindings {
                binding.request_timeout_ms = timeout;
            }
        }
        Ok(())
    }

    /// The node identity as a parsed DID.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidIdentity`.
    pub fn local_did(&self) -> Result<Did, ConfigError> {
        parse_did(&self.identity)
    }

    /// Parsed `known_identities`.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidIdentity` for the first malformed entry.
    pub fn known_dids(&self) -> Result<Vec<Did>, ConfigError> {
        self.known_identities.iter().map(|s| parse_did(s)).collect()
    }

    /// # Errors
    ///
    /// The first problem found: malformed identities, invalid or duplicate
    /// binding names, or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.local_did()?;
        self.known_dids()?;

        if self.resolver.ttl_secs == 0 {
            return Err(ConfigError::ZeroTimeout("resolver.ttl_secs"));
        }

        let mut names = HashSet::new();
        for binding in &self.bindings {
            if binding.request_timeout_ms == 0 {
                return Err(ConfigError::ZeroTimeout("request_timeout_ms"));
            }
            if binding.connect_timeout_ms == 0 {
                return Err(ConfigError::ZeroTimeout("connect_timeout_ms"));
            }
            binding.validate()?;
            if !names.insert(binding.name.as_str()) {
                return Err(ConfigError::Binding(format!(
                    "duplicate binding name '{}'",
                    binding.name
                )));
            }
        }
        Ok(())
    }
}

fn parse_did(value: &str) -> Result<Did, ConfigError> {
    Did::parse(value).map_err(|source| ConfigError::InvalidIdentity {
        value: value.to_string(),
        source,
    })
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
