//! Framed codec for agent messages.
//!
//! Uses LengthDelimitedCodec for the 4-byte big-endian length prefix and
//! the protocol module for payloads. The codec is synchronous; it is driven
//! by hand against the serialized channel rather than through a Framed stream.

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::protocol::{AgentRequest, AgentResponse};
use crate::error::PageantError;

/// Maximum frame size, prefix included, that fits the shared segment.
pub const MAX_MESSAGE_LEN: usize = 8192;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload a frame may declare.
pub const MAX_PAYLOAD_LEN: usize = MAX_MESSAGE_LEN - LENGTH_PREFIX_LEN;

/// Read the declared payload length of a frame. `None` if shorter than the prefix.
pub fn declared_len(frame: &[u8]) -> Option<usize> {
    let prefix: [u8; LENGTH_PREFIX_LEN] = frame.get(..LENGTH_PREFIX_LEN)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

/// Check a request frame before any OS resource is touched.
pub fn validate_request(frame: &[u8]) -> Result<(), PageantError> {
    if frame.len() > MAX_MESSAGE_LEN {
        return Err(PageantError::MessageTooLong { len: frame.len() });
    }
    match declared_len(frame) {
        Some(len) if frame.len() - LENGTH_PREFIX_LEN == len => Ok(()),
        _ => Err(PageantError::InvalidMessageFormat),
    }
}

/// Codec that frames agent requests and parses agent replies.
pub struct AgentCodec {
    inner: LengthDelimitedCodec,
}

impl Default for AgentCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(LENGTH_PREFIX_LEN)
                .max_frame_length(MAX_PAYLOAD_LEN)
                .new_codec(),
        }
    }
}

impl Decoder for AgentCodec {
    type Item = AgentResponse;
    type Error = PageantError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(frame) => AgentResponse::parse(&frame).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<AgentRequest> for AgentCodec {
    type Error = PageantError;

    fn encode(&mut self, item: AgentRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.to_payload()?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PageantError::MessageTooLong {
                len: payload.len() + LENGTH_PREFIX_LEN,
            });
        }
        tracing::trace!(kind = item.kind(), payload_bytes = payload.len(), "Encoding frame");
        self.inner.encode(payload, dst)?;
        Ok(())
    }
}
