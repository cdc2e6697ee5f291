//! Error types for npc.

use serde_json::Value;
use thiserror::Error;

/// Wire payload for a call whose method has no registered handler.
pub const UNIMPLEMENTED: &str = "unimplemented";
/// Wire payload for a call abandoned through its cancellation token.
pub const CANCELLED: &str = "cancelled";
/// Wire payload for a call whose local deadline elapsed.
pub const TIMED_OUT: &str = "timedout";
/// Wire payload for a call torn down with its endpoint.
pub const DISCONNECTED: &str = "disconnected";

/// Main error type for all npc operations.
#[derive(Debug, Error)]
pub enum NpcError {
    /// The peer has no handler for the delivered method.
    #[error("unimplemented")]
    Unimplemented,

    /// The call was cancelled, locally or by the peer.
    #[error("cancelled")]
    Cancelled,

    /// No Ack arrived before the call's timeout.
    #[error("timedout")]
    TimedOut,

    /// The endpoint was closed or has no transport attached.
    #[error("disconnected")]
    Disconnected,

    /// The peer's handler failed with this payload.
    #[error("remote error: {0}")]
    Remote(Value),

    /// The outbound send primitive failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The outbound channel stayed full for longer than the send timeout.
    #[error("send timeout")]
    SendTimeout,

    /// Too many calls are already waiting for an Ack.
    #[error("too many pending calls")]
    TooManyPending,

    /// A payload did not decode into the requested type.
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

impl NpcError {
    /// Map the error payload of a failed Ack back to an error.
    ///
    /// The four protocol strings become their variants; any other payload is
    /// the peer handler's own error and is kept verbatim.
    pub fn from_wire(error: Value) -> Self {
        match error.as_str() {
            Some(UNIMPLEMENTED) => NpcError::Unimplemented,
            Some(CANCELLED) => NpcError::Cancelled,
            Some(TIMED_OUT) => NpcError::TimedOut,
            Some(DISCONNECTED) => NpcError::Disconnected,
            _ => NpcError::Remote(error),
        }
    }

    /// Payload to put in a failure Ack for this error.
    pub fn to_wire(&self) -> Value {
        match self {
            NpcError::Unimplemented => Value::from(UNIMPLEMENTED),
            NpcError::Cancelled => Value::from(CANCELLED),
            NpcError::TimedOut => Value::from(TIMED_OUT),
            NpcError::Disconnected => Value::from(DISCONNECTED),
            NpcError::Remote(payload) => payload.clone(),
            other => Value::from(other.to_string()),
        }
    }

    /// Whether this is one of the protocol-level outcomes rather than a
    /// handler or local failure.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            NpcError::Unimplemented | NpcError::Cancelled | NpcError::TimedOut
        )
    }
}

/// Result type alias using NpcError.
pub type Result<T> = std::result::Result<T, NpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_protocol_strings_map_to_variants() {
        assert!(matches!(
            NpcError::from_wire(json!("unimplemented")),
            NpcError::Unimplemented
        ));
        assert!(matches!(
            NpcError::from_wire(json!("cancelled")),
            NpcError::Cancelled
        ));
        assert!(matches!(
            NpcError::from_wire(json!("timedout")),
            NpcError::TimedOut
        ));
        assert!(matches!(
            NpcError::from_wire(json!("disconnected")),
            NpcError::Disconnected
        ));
    }

    #[test]
    fn test_other_payloads_stay_remote() {
        match NpcError::from_wire(json!({"code": 7})) {
            NpcError::Remote(v) => assert_eq!(v, json!({"code": 7})),
            other => panic!("unexpected {other:?}"),
        }
        match NpcError::from_wire(json!("disk full")) {
            NpcError::Remote(v) => assert_eq!(v, json!("disk full")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_to_wire() {
        assert_eq!(NpcError::Cancelled.to_wire(), json!("cancelled"));
        assert_eq!(NpcError::TimedOut.to_wire(), json!("timedout"));
        assert_eq!(NpcError::Remote(json!([1, 2])).to_wire(), json!([1, 2]));
        assert_eq!(NpcError::SendTimeout.to_wire(), json!("send timeout"));
    }

    #[test]
    fn test_display() {
        assert_eq!(NpcError::Unimplemented.to_string(), "unimplemented");
        assert_eq!(
            NpcError::Transport("broken pipe".into()).to_string(),
            "transport error: broken pipe"
        );
        assert!(NpcError::TimedOut.is_protocol());
        assert!(!NpcError::Disconnected.is_protocol());
    }
}
