//! Built-in operation handlers.

pub mod probe;

pub use probe::{PingHandler, PongHandler, ProbeTracker, PING, PONG};
