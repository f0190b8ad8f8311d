//! # HSTP Test Suite
//!
//! ```text
//! tests/
//! ├── benches/          # Frame codec and topic addressing throughput
//! └── src/integration/  # Multi-node scenarios over one in-process broker
//!     ├── ping_pong.rs  # request/response, probes, error replies, channels
//!     ├── reconnect.rs  # broker outage, reconnection, resubscription
//!     └── chain.rs      # interceptor ordering through a live engine
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p hstp-tests
//! cargo test -p hstp-tests integration::reconnect
//! cargo bench -p hstp-tests
//! ```

pub mod integration;
