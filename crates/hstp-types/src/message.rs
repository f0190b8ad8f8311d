//! # Message
//!
//! `{header, payload}`. The payload is a lazy, finite, single-pass byte
//! stream; it is read at most once and never buffered implicitly.

use crate::errors::MessageError;
use crate::header::{Header, MessageId};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt;

/// Boxed stream of payload chunks.
pub type PayloadStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Message body.
pub struct Payload(PayloadInner);

enum PayloadInner {
    Empty,
    Buffered(Bytes),
    // Mutex keeps `Payload: Sync` so `&Message` can be held across awaits.
    Streaming(Mutex<PayloadStream>),
}

impl Payload {
    /// A payload with no bytes.
    #[must_use]
    pub fn empty() -> Self {
        Self(PayloadInner::Empty)
    }

    /// A payload already held in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::empty()
        } else {
            Self(PayloadInner::Buffered(bytes))
        }
    }

    /// A payload produced lazily by a stream of chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        Self(PayloadInner::Streaming(Mutex::new(stream.boxed())))
    }

    /// Whether the payload is backed by an unread stream.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self.0, PayloadInner::Streaming(_))
    }

    /// The bytes of a non-streaming payload.
    #[must_use]
    pub fn buffered(&self) -> Option<Bytes> {
        match &self.0 {
            PayloadInner::Empty => Some(Bytes::new()),
            PayloadInner::Buffered(bytes) => Some(bytes.clone()),
            PayloadInner::Streaming(_) => None,
        }
    }

    /// Duplicate a non-streaming payload. Streams cannot be duplicated.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        self.buffered().map(Self::from_bytes)
    }

    /// Consume the payload as a stream of chunks.
    pub fn into_stream(self) -> PayloadStream {
        match self.0 {
            PayloadInner::Empty => stream::empty().boxed(),
            PayloadInner::Buffered(bytes) => {
                stream::once(async move { Ok::<_, std::io::Error>(bytes) }).boxed()
            }
            PayloadInner::Streaming(stream) => stream.into_inner(),
        }
    }

    /// Consume the payload into a single buffer of at most `limit` bytes.
    ///
    /// # Errors
    ///
    /// - `MessageError::PayloadTooLarge` - more than `limit` bytes were produced
    /// - `MessageError::Stream` - the underlying stream failed
    pub async fn collect(self, limit: usize) -> Result<Bytes, MessageError> {
        match self.0 {
            PayloadInner::Empty => Ok(Bytes::new()),
            PayloadInner::Buffered(bytes) => {
                if bytes.len() > limit {
                    return Err(MessageError::PayloadTooLarge { limit });
                }
                Ok(bytes)
            }
            PayloadInner::Streaming(stream) => {
                let mut stream = stream.into_inner();
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    if buffer.len() + chunk.len() > limit {
                        return Err(MessageError::PayloadTooLarge { limit });
                    }
                    buffer.extend_from_slice(&chunk);
                }
                Ok(buffer.freeze())
            }
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            PayloadInner::Empty => f.write_str("Payload::Empty"),
            PayloadInner::Buffered(bytes) => write!(f, "Payload::Buffered({} bytes)", bytes.len()),
            PayloadInner::Streaming(_) => f.write_str("Payload::Streaming"),
        }
    }
}

/// A protocol message. Immutable once constructed.
#[derive(Debug)]
pub struct Message {
    header: Header,
    payload: Payload,
}

impl Message {
    /// Create a message from its parts.
    #[must_use]
    pub fn new(header: Header, payload: Payload) -> Self {
        Self { header, payload }
    }

    /// A message with an empty payload.
    #[must_use]
    pub fn without_payload(header: Header) -> Self {
        Self::new(header, Payload::empty())
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.header.id
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.header.operation
    }

    /// Split into header and payload.
    #[must_use]
    pub fn into_parts(self) -> (Header, Payload) {
        (self.header, self.payload)
    }

    /// Duplicate a message whose payload is not a stream.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        self.payload
            .try_clone()
            .map(|payload| Self::new(self.header.clone(), payload))
    }

    /// Produce a new message carrying an extra header property.
    #[must_use]
    pub fn with_property(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (mut header, payload) = self.into_parts();
        header.properties.insert(key.into(), value.into());
        Self::new(header, payload)
    }
}
