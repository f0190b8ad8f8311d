//! # Decentralized Identifiers
//!
//! A `Did` is an opaque, method-qualified identifier of the form
//! `<scheme>:<method>:<method-specific-id>`. It is validated once on
//! construction and never mutated afterwards; derivations return new values.

use crate::errors::DidError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated, method-qualified identity string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse and validate an identity string.
    ///
    /// # Errors
    ///
    /// - `DidError::Empty` - the string is empty
    /// - `DidError::Malformed` - fewer than three segments, or an invalid
    ///   scheme/method segment
    pub fn parse(value: impl Into<String>) -> Result<Self, DidError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DidError::Empty);
        }

        let mut parts = value.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        let method = parts.next().unwrap_or_default();
        let specific = parts.next().unwrap_or_default();

        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DidError::Malformed {
                value,
                reason: "scheme must be non-empty alphanumeric",
            });
        }
        if method.is_empty()
            || !method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(DidError::Malformed {
                value,
                reason: "method must be non-empty lowercase alphanumeric",
            });
        }
        if specific.is_empty() || specific.ends_with(':') {
            return Err(DidError::Malformed {
                value,
                reason: "method-specific id must be non-empty",
            });
        }
        if value.chars().any(char::is_whitespace) {
            return Err(DidError::Malformed {
                value,
                reason: "whitespace is not allowed",
            });
        }

        Ok(Self(value))
    }

    /// The scheme segment (usually `did`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// The method segment, used to select a resolver.
    #[must_use]
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// Everything after `<scheme>:<method>:`.
    #[must_use]
    pub fn method_specific_id(&self) -> &str {
        self.0.splitn(3, ':').nth(2).unwrap_or_default()
    }

    /// Derive a child identifier by appending a `:`-separated segment.
    ///
    /// `did:web:example.com` + `agent` → `did:web:example.com:agent`
    pub fn child(&self, segment: &str) -> Result<Self, DidError> {
        validate_segment(segment)?;
        Self::parse(format!("{}:{}", self.0, segment))
    }

    /// Derive a sibling identifier by replacing the last segment of the
    /// method-specific id.
    ///
    /// `did:web:example.com:alice` + `bob` → `did:web:example.com:bob`.
    /// An identifier whose method-specific id has a single segment has its
    /// whole method-specific id replaced.
    pub fn sibling(&self, segment: &str) -> Result<Self, DidError> {
        validate_segment(segment)?;
        let specific = self.method_specific_id();
        let replaced = match specific.rsplit_once(':') {
            Some((parent, _)) => format!("{parent}:{segment}"),
            None => segment.to_string(),
        };
        Self::parse(format!("{}:{}:{}", self.scheme(), self.method(), replaced))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_segment(segment: &str) -> Result<(), DidError> {
    if segment.is_empty() || segment.contains(':') || segment.chars().any(char::is_whitespace) {
        return Err(DidError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = DidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
