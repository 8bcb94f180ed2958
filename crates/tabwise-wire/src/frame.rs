//! Tagged frames recognising protocol traffic on a shared channel.
//!
//! The messaging channel also carries messages that have nothing to do with
//! this protocol. Both envelope kinds therefore travel nested under a single
//! well-known key, and receivers test for that key before attempting a full
//! parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{RequestEnvelope, ResponseEnvelope};

/// Key under which protocol envelopes are nested on the wire.
pub const ENVELOPE_TAG: &str = "tabwise";

/// A request envelope wrapped in the protocol tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// The nested request envelope.
    #[serde(rename = "tabwise")]
    pub envelope: RequestEnvelope,
}

impl RequestFrame {
    /// Wraps a request envelope for transmission.
    #[must_use]
    pub const fn new(envelope: RequestEnvelope) -> Self {
        Self { envelope }
    }
}

/// A response envelope wrapped in the protocol tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// The nested response envelope.
    #[serde(rename = "tabwise")]
    pub envelope: ResponseEnvelope,
}

impl ResponseFrame {
    /// Wraps a response envelope for transmission.
    #[must_use]
    pub const fn new(envelope: ResponseEnvelope) -> Self {
        Self { envelope }
    }
}

/// Reports whether a raw channel message is a protocol frame.
///
/// This is a cheap shape test, not a full parse: it only checks for the
/// envelope tag so unrelated traffic can be skipped without deserialisation
/// cost.
#[must_use]
pub fn is_protocol_frame(message: &Value) -> bool {
    message
        .as_object()
        .is_some_and(|object| object.contains_key(ENVELOPE_TAG))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_frame_nests_under_tag() {
        let frame = RequestFrame::new(RequestEnvelope::new("page.content", Value::Null));
        let value = serde_json::to_value(&frame).expect("serialise frame");
        assert!(value.get(ENVELOPE_TAG).is_some());
        assert_eq!(value[ENVELOPE_TAG]["route"], "page.content");
    }

    #[test]
    fn recognises_protocol_frames() {
        let frame = RequestFrame::new(RequestEnvelope::new("page.content", Value::Null));
        let value = serde_json::to_value(&frame).expect("serialise frame");
        assert!(is_protocol_frame(&value));
    }

    #[test]
    fn ignores_unrelated_messages() {
        assert!(!is_protocol_frame(&json!({ "action": "getBody" })));
        assert!(!is_protocol_frame(&json!("plain text")));
        assert!(!is_protocol_frame(&Value::Null));
    }
}
