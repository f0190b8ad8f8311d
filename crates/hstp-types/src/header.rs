//! # Message Header
//!
//! The logical envelope fields every transport binding marshals:
//! `id, operation, source, destination?, channel?, status?, inReplyTo?,
//! mediaType, timestamp, expectResponse` plus free-form properties.
//!
//! ## Addressing
//!
//! - `channel` set → publish/subscribe, regardless of `destination`
//! - `destination` only → point-to-point
//! - neither → broadcast / unaddressed

use crate::errors::MessageError;
use crate::identity::Did;
use crate::time::Timestamp;
use crate::DEFAULT_MEDIA_TYPE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique message identifier.
///
/// Uses UUID v7 so ids are time-ordered, which keeps log correlation and
/// request/response matching readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new message id (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Dominant addressing mode of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing<'a> {
    /// Publish/subscribe to a channel.
    Channel(&'a Did),
    /// Point-to-point to a destination identity.
    Direct(&'a Did),
    /// Neither channel nor destination.
    Broadcast,
}

/// Protocol message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Unique per message.
    pub id: MessageId,
    /// Operation name; case-sensitive.
    pub operation: String,
    /// Sender identity.
    pub source: Did,
    /// Point-to-point recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Did>,
    /// Publish/subscribe channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Did>,
    /// Optional numeric status (responses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Id of the message this one responds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<MessageId>,
    /// Media type of the payload.
    pub media_type: String,
    /// Creation time.
    pub timestamp: Timestamp,
    /// Whether the sender awaits a correlated response.
    #[serde(default)]
    pub expect_response: bool,
    /// Custom header properties and interceptor annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Header {
    /// Start building a header for `operation` sent by `source`.
    pub fn builder(operation: impl Into<String>, source: Did) -> HeaderBuilder {
        HeaderBuilder::new(operation, source)
    }

    /// The dominant addressing mode. A channel always wins.
    #[must_use]
    pub fn addressing(&self) -> Addressing<'_> {
        match (&self.channel, &self.destination) {
            (Some(channel), _) => Addressing::Channel(channel),
            (None, Some(destination)) => Addressing::Direct(destination),
            (None, None) => Addressing::Broadcast,
        }
    }

    /// Whether this header is a response to another message.
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.in_reply_to.is_some()
    }

    /// Look up a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Start a response header: fresh id, `in_reply_to` set to this header's
    /// id, destination set to this header's source.
    pub fn reply(&self, operation: impl Into<String>, source: Did) -> HeaderBuilder {
        HeaderBuilder::new(operation, source)
            .in_reply_to(self.id)
            .destination(self.source.clone())
    }
}

/// Builder for [`Header`]. Generates an id and timestamp when absent.
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    id: Option<MessageId>,
    operation: String,
    source: Did,
    destination: Option<Did>,
    channel: Option<Did>,
    status: Option<u16>,
    in_reply_to: Option<MessageId>,
    media_type: Option<String>,
    timestamp: Option<Timestamp>,
    expect_response: bool,
    properties: BTreeMap<String, String>,
}

impl HeaderBuilder {
    fn new(operation: impl Into<String>, source: Did) -> Self {
        Self {
            id: None,
            operation: operation.into(),
            source,
            destination: None,
            channel: None,
            status: None,
            in_reply_to: None,
            media_type: None,
            timestamp: None,
            expect_response: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn destination(mut self, destination: Did) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn channel(mut self, channel: Did) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn in_reply_to(mut self, id: MessageId) -> Self {
        self.in_reply_to = Some(id);
        self
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn expect_response(mut self, expect: bool) -> Self {
        self.expect_response = expect;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Finish the header.
    ///
    /// # Errors
    ///
    /// `MessageError::MissingOperation` if the operation name is empty.
    pub fn build(self) -> Result<Header, MessageError> {
        if self.operation.is_empty() {
            return Err(MessageError::MissingOperation);
        }
        Ok(Header {
            id: self.id.unwrap_or_default(),
            operation: self.operation,
            source: self.source,
            destination: self.destination,
            channel: self.channel,
            status: self.status,
            in_reply_to: self.in_reply_to,
            media_type: self
                .media_type
                .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
            timestamp: self.timestamp.unwrap_or_else(Timestamp::now),
            expect_response: self.expect_response,
            properties: self.properties,
        })
    }
}
