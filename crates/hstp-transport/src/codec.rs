//! # Frame Codec
//!
//! ```text
//! ┌──────────────────┬──────────────────────┬─────────────────┐
//! │ header_len (u32) │ header (JSON, UTF-8) │ payload (bytes) │
//! │   big-endian     │   header_len bytes   │   remainder     │
//! └──────────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! Identities in the header are validated while decoding; a frame with a
//! malformed identity never becomes a `Message`.

use crate::error::TransportError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use hstp_types::{Header, Message, Payload};

const LENGTH_PREFIX: usize = 4;

/// Encode a header and an already-collected payload into one frame.
///
/// # Errors
///
/// `TransportError::Codec` if the header cannot be serialized or is larger
/// than a `u32` length prefix allows.
pub fn encode_frame(header: &Header, payload: &[u8]) -> Result<Bytes, TransportError> {
    let header_json =
        serde_json::to_vec(header).map_err(|e| TransportError::Codec(e.to_string()))?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| TransportError::Codec("header too large".to_string()))?;

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX + header_json.len() + payload.len());
    frame.put_u32(header_len);
    frame.put_slice(&header_json);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Consume a message into a frame, reading at most `max_payload` bytes of
/// payload.
///
/// # Errors
///
/// - `TransportError::PayloadTooLarge` - the payload exceeded `max_payload`
/// - `TransportError::Codec` - the payload stream failed or the header did
///   not serialize
pub async fn encode_message(message: Message, max_payload: usize) -> Result<Bytes, TransportError> {
    let (header, payload) = message.into_parts();
    let body = payload.collect(max_payload).await?;
    encode_frame(&header, &body)
}

/// Decode a frame into a message. The payload is a zero-copy slice of the
/// frame.
///
/// # Errors
///
/// `TransportError::Codec` for truncated frames, invalid JSON, malformed
/// identities or an empty operation.
pub fn decode_frame(mut frame: Bytes) -> Result<Message, TransportError> {
    if frame.len() < LENGTH_PREFIX {
        return Err(TransportError::Codec(format!(
            "frame of {} bytes is shorter than the length prefix",
            frame.len()
        )));
    }
    let header_len = frame.get_u32() as usize;
    if header_len > frame.len() {
        return Err(TransportError::Codec(format!(
            "header length {header_len} exceeds remaining {} bytes",
            frame.len()
        )));
    }

    let header_bytes = frame.split_to(header_len);
    let header: Header = serde_json::from_slice(&header_bytes)
        .map_err(|e| TransportError::Codec(format!("invalid header: {e}")))?;
    if header.operation.is_empty() {
        return Err(TransportError::Codec("header has no operation".to_string()));
    }

    Ok(Message::new(header, Payload::from_bytes(frame)))
}
