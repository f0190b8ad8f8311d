//! # Pub/Sub Binding
//!
//! Reference [`TransportBinding`](crate::TransportBinding) over a topic
//! broker (MQTT-equivalent): point-to-point messages go to the recipient's
//! direct topic, channel messages to the channel topic, and the broker's
//! native fan-out delivers them.

mod binding;
mod broker;

pub use binding::PubSubBinding;
pub use broker::{BrokerConnector, BrokerSession, ConnectOptions, Connection};
