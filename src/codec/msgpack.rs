//! MsgPack codec using `rmp-serde`.
//!
//! Always uses `to_vec_named`: the envelope travels as a map keyed by field
//! name, so optional fields can simply be left out and peers written in other
//! languages see `{typ, id, method, param, error}` objects.

use bytes::Bytes;

use crate::error::Result;
use crate::message::Message;

/// MessagePack codec for protocol messages.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a message to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if a payload cannot be serialized.
    #[inline]
    pub fn encode(message: &Message) -> Result<Bytes> {
        Ok(Bytes::from(rmp_serde::to_vec_named(message)?))
    }

    /// Decode MsgPack bytes to a message.
    ///
    /// Unknown kinds decode to [`Typ::Unknown`](crate::Typ::Unknown) rather
    /// than failing.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a MsgPack-encoded envelope.
    #[inline]
    pub fn decode(bytes: &[u8]) -> Result<Message> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
