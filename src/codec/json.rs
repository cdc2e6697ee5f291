//! JSON codec using `serde_json`, for text channels.

use bytes::Bytes;

use crate::error::Result;
use crate::message::Message;

/// JSON codec for protocol messages.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a message to JSON bytes.
    #[inline]
    pub fn encode(message: &Message) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(message)?))
    }

    /// Decode JSON bytes to a message.
    #[inline]
    pub fn decode(bytes: &[u8]) -> Result<Message> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
