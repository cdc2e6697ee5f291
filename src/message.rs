//! Wire envelope exchanged between two endpoints.
//!
//! Every interaction is one of five message kinds:
//!
//! | Kind    | id | method | param | error |
//! |---------|----|--------|-------|-------|
//! | Emit    | -  | yes    | yes   | -     |
//! | Deliver | yes| yes    | yes   | -     |
//! | Notify  | yes| -      | yes   | -     |
//! | Ack     | yes| -      | on success | on failure |
//! | Cancel  | yes| -      | -     | -     |
//!
//! Absent fields are omitted on the wire. A `null` payload that is present is
//! kept as `Some(Value::Null)`, so "present but null" and "absent" survive a
//! round trip through any codec.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Correlation id of one outstanding call.
pub type CallId = u32;

/// Message kind. Encoded on the wire as a small unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Typ {
    /// Fire-and-forget invocation.
    Emit,
    /// Request expecting an Ack.
    Deliver,
    /// Progress for an outstanding Deliver.
    Notify,
    /// Terminal response for a Deliver.
    Ack,
    /// Request to abandon an outstanding Deliver.
    Cancel,
    /// A kind this endpoint does not understand.
    Unknown(u8),
}

impl From<u8> for Typ {
    fn from(value: u8) -> Self {
        match value {
            0 => Typ::Emit,
            1 => Typ::Deliver,
            2 => Typ::Notify,
            3 => Typ::Ack,
            4 => Typ::Cancel,
            n => Typ::Unknown(n),
        }
    }
}

impl From<Typ> for u8 {
    fn from(typ: Typ) -> Self {
        match typ {
            Typ::Emit => 0,
            Typ::Deliver => 1,
            Typ::Notify => 2,
            Typ::Ack => 3,
            Typ::Cancel => 4,
            Typ::Unknown(n) => n,
        }
    }
}

/// A protocol message.
///
/// Use the per-kind constructors to build well-formed messages. Fields are
/// public because inbound messages come from a peer and may be malformed; the
/// endpoint validates them on receipt and drops what it cannot use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message kind.
    pub typ: Typ,
    /// Call id, absent on Emit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CallId>,
    /// Handler name, only on Emit and Deliver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Opaque payload.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub param: Option<Value>,
    /// Opaque failure payload, only on a failed Ack.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub error: Option<Value>,
}

/// A field that appears on the wire is present, even when it is `null`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Message {
    /// Build an Emit message.
    pub fn emit(method: impl Into<String>, param: Value) -> Self {
        Self {
            typ: Typ::Emit,
            id: None,
            method: Some(method.into()),
            param: Some(param),
            error: None,
        }
    }

    /// Build a Deliver message.
    pub fn deliver(id: CallId, method: impl Into<String>, param: Value) -> Self {
        Self {
            typ: Typ::Deliver,
            id: Some(id),
            method: Some(method.into()),
            param: Some(param),
            error: None,
        }
    }

    /// Build a Notify message.
    pub fn notify(id: CallId, param: Value) -> Self {
        Self {
            typ: Typ::Notify,
            id: Some(id),
            method: None,
            param: Some(param),
            error: None,
        }
    }

    /// Build an Ack message. Exactly one of `param`/`error` is set.
    pub fn ack(id: CallId, outcome: std::result::Result<Value, Value>) -> Self {
        let (param, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            typ: Typ::Ack,
            id: Some(id),
            method: None,
            param,
            error,
        }
    }

    /// Build a Cancel message.
    pub fn cancel(id: CallId) -> Self {
        Self {
            typ: Typ::Cancel,
            id: Some(id),
            method: None,
            param: None,
            error: None,
        }
    }

    /// Message kind.
    #[inline]
    pub fn typ(&self) -> Typ {
        self.typ
    }

    /// Check if this is an Emit.
    #[inline]
    pub fn is_emit(&self) -> bool {
        self.typ == Typ::Emit
    }

    /// Check if this is a Deliver.
    #[inline]
    pub fn is_deliver(&self) -> bool {
        self.typ == Typ::Deliver
    }

    /// Check if this is a Notify.
    #[inline]
    pub fn is_notify(&self) -> bool {
        self.typ == Typ::Notify
    }

    /// Check if this is an Ack.
    #[inline]
    pub fn is_ack(&self) -> bool {
        self.typ == Typ::Ack
    }

    /// Check if this is a Cancel.
    #[inline]
    pub fn is_cancel(&self) -> bool {
        self.typ == Typ::Cancel
    }

    /// Outcome carried by an Ack: the error if one is set, otherwise the
    /// param (`null` when the peer sent neither).
    ///
    /// A `null` error counts as no error. JavaScript peers test the error
    /// with `!= undefined`, and some of their MessagePack encoders write an
    /// unset error as nil.
    pub fn into_outcome(self) -> std::result::Result<Value, Value> {
        match self.error {
            Some(error) if !error.is_null() => Err(error),
            _ => Ok(self.param.unwrap_or(Value::Null)),
        }
    }
}
