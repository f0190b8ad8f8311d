//! Cross-crate scenarios. Each node runs the full wiring from `hstp-node`.

pub mod chain;
pub mod ping_pong;
pub mod reconnect;

use hstp_node::NodeConfig;

/// A node configuration for `identity` that also knows `peers`.
pub fn node_config(identity: &str, peers: &[&str]) -> NodeConfig {
    let mut config = NodeConfig {
        identity: identity.to_string(),
        known_identities: peers.iter().map(|p| p.to_string()).collect(),
        ..NodeConfig::default()
    };
    for binding in &mut config.bindings {
        binding.request_timeout_ms = 2_000;
        binding.retry.base_delay_ms = 10;
        binding.retry.max_delay_ms = 50;
    }
    config
}
