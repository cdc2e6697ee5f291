//! Codec module - byte encodings of [`Message`](crate::Message).
//!
//! The endpoint itself exchanges structured [`Message`](crate::Message)
//! values. Hosts whose channel carries bytes pick one of these codecs:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`, struct-as-map)
//! - [`JsonCodec`] - JSON text using `serde_json`
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.
//!
//! # Example
//!
//! ```
//! use npc::codec::{JsonCodec, MsgPackCodec};
//! use npc::Message;
//! use serde_json::json;
//!
//! let message = Message::deliver(1, "download", json!("/path"));
//!
//! let bytes = MsgPackCodec::encode(&message).unwrap();
//! assert_eq!(MsgPackCodec::decode(&bytes).unwrap(), message);
//!
//! let text = JsonCodec::encode(&message).unwrap();
//! assert_eq!(JsonCodec::decode(&text).unwrap(), message);
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
