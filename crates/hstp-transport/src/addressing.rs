//! # Addressing
//!
//! Topic derivation is a pure function of the identity, so every binding
//! instance (and every restart) derives the same address:
//!
//! - point-to-point → `{prefix}/direct/{normalized-identity}`
//! - channel        → `{prefix}/channel/{normalized-identity}`
//! - unaddressed    → `{prefix}/broadcast`
//!
//! Normalization keeps ASCII alphanumerics and `-.~`, maps `:` to `_`, and
//! percent-encodes every other byte (including `_` and `%` themselves), so
//! the mapping is injective and never produces topic separators or
//! wildcards.

use hstp_types::{Addressing, Did, Header};
use std::fmt::Write;

const DIRECT: &str = "direct";
const CHANNEL: &str = "channel";
const BROADCAST: &str = "broadcast";

/// Normalize an identity string into a topic-legal token.
#[must_use]
pub fn normalize(identity: &str) -> String {
    let mut out = String::with_capacity(identity.len());
    for byte in identity.bytes() {
        match byte {
            b':' => out.push('_'),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'~' => out.push(byte as char),
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}

/// Topic naming under a configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLayout {
    prefix: String,
}

impl TopicLayout {
    /// Trailing `/` on the prefix is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn direct(&self, identity: &Did) -> String {
        format!("{}/{}/{}", self.prefix, DIRECT, normalize(identity.as_str()))
    }

    #[must_use]
    pub fn channel(&self, channel: &Did) -> String {
        format!("{}/{}/{}", self.prefix, CHANNEL, normalize(channel.as_str()))
    }

    #[must_use]
    pub fn broadcast(&self) -> String {
        format!("{}/{}", self.prefix, BROADCAST)
    }

    /// Topic for a message header, by its dominant addressing mode.
    #[must_use]
    pub fn for_header(&self, header: &Header) -> String {
        match header.addressing() {
            Addressing::Channel(channel) => self.channel(channel),
            Addressing::Direct(destination) => self.direct(destination),
            Addressing::Broadcast => self.broadcast(),
        }
    }
}
