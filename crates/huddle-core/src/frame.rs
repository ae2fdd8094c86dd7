//! Relay frame codec.
//!
//! Two frame kinds travel over a group connection:
//!
//! | Kind | Layout |
//! |---|---|
//! | Text | UTF-8 JSON object, optional `sender` / `receiver` / `type` strings |
//! | Binary | bytes `0..16` identity, optional bytes `16..24` little-endian `f64` timestamp |
//!
//! Text frames are relayed verbatim. A binary frame longer than the identity
//! is a ping: the sender gets a direct PONG and only the identity prefix is
//! relayed.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ids::ClientIdentity;

/// End offset of the little-endian timestamp in a ping frame.
pub const TIMESTAMP_END: usize = ClientIdentity::WIRE_LEN + 8;

/// Errors raised while decoding a text frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame carried no bytes.
    #[error("empty text frame")]
    Empty,
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The payload is valid JSON but not an object.
    #[error("text frame is not a JSON object")]
    NotAnObject,
}

/// One application frame read from a peer.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// UTF-8 text, expected to hold a JSON object.
    Text(String),
    /// Raw bytes: identity prefix plus optional ping timestamp.
    Binary(Bytes),
}

impl InboundFrame {
    /// Metric label for the frame kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

/// Diagnostic fields of a text frame.
///
/// None of these influence routing: every valid text frame goes to the
/// whole group. Non-string values are treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextEnvelope {
    /// Claimed identity of the author.
    pub sender: Option<String>,
    /// Intended recipient, logged only.
    pub receiver: Option<String>,
    /// Application message type (e.g. `OFFER`), logged only.
    pub kind: Option<String>,
}

impl TextEnvelope {
    /// Parse a text frame as a JSON object and pull out its diagnostic fields.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        if text.is_empty() {
            return Err(FrameError::Empty);
        }
        let Value::Object(map) = serde_json::from_str::<Value>(text)? else {
            return Err(FrameError::NotAnObject);
        };
        Ok(Self {
            sender: string_field(&map, "sender"),
            receiver: string_field(&map, "receiver"),
            kind: string_field(&map, "type"),
        })
    }

    /// Identity claimed by `sender`, if any.
    pub fn sender_identity(&self) -> Option<ClientIdentity> {
        self.sender.as_deref().and_then(ClientIdentity::parse)
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// A decoded binary frame.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryFrame {
    /// Identity carried by the first 16 bytes, when the frame is long enough.
    pub identity: Option<ClientIdentity>,
    /// Peer-reported timestamp when the frame is a ping (longer than 16 bytes).
    pub ping: Option<f64>,
    /// Bytes to relay to the group.
    pub relay: Bytes,
}

impl BinaryFrame {
    /// Split a binary frame into identity, ping timestamp and relay payload.
    pub fn decode(data: &Bytes) -> Self {
        let identity = ClientIdentity::from_wire(data);
        if data.len() > ClientIdentity::WIRE_LEN {
            Self {
                identity,
                ping: Some(read_timestamp(data)),
                relay: data.slice(..ClientIdentity::WIRE_LEN),
            }
        } else {
            Self {
                identity,
                ping: None,
                relay: data.clone(),
            }
        }
    }
}

/// Read the little-endian IEEE-754 timestamp at bytes `16..24`.
///
/// Frames that stop short of byte 24 report `0.0`.
pub fn read_timestamp(data: &[u8]) -> f64 {
    data.get(ClientIdentity::WIRE_LEN..TIMESTAMP_END)
        .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
        .map_or(0.0, f64::from_le_bytes)
}

#[derive(Serialize)]
struct Pong {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: f64,
}

/// Encode the direct reply to a ping: `{"type":"PONG","timestamp":T}`.
///
/// Non-finite timestamps serialize as `null`.
pub fn pong_reply(timestamp: f64) -> Result<String, FrameError> {
    Ok(serde_json::to_string(&Pong {
        kind: "PONG",
        timestamp,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_frame(identity: [u8; 16], timestamp: f64) -> Bytes {
        let mut buf = identity.to_vec();
        buf.extend_from_slice(&timestamp.to_le_bytes());
        Bytes::from(buf)
    }

    #[test]
    fn envelope_reads_diagnostic_fields() {
        let env =
            TextEnvelope::parse(r#"{"sender":"a","receiver":"b","type":"OFFER","sdp":"x"}"#)
                .unwrap();
        assert_eq!(env.sender.as_deref(), Some("a"));
        assert_eq!(env.receiver.as_deref(), Some("b"));
        assert_eq!(env.kind.as_deref(), Some("OFFER"));
        assert_eq!(env.sender_identity().unwrap().as_str(), "a");
    }

    #[test]
    fn envelope_fields_are_optional() {
        let env = TextEnvelope::parse(r#"{"candidate":"..."}"#).unwrap();
        assert_eq!(env, TextEnvelope::default());
    }

    #[test]
    fn non_string_sender_is_ignored() {
        let env = TextEnvelope::parse(r#"{"sender":42,"type":["x"]}"#).unwrap();
        assert!(env.sender.is_none());
        assert!(env.kind.is_none());
    }

    #[test]
    fn empty_sender_does_not_identify() {
        let env = TextEnvelope::parse(r#"{"sender":""}"#).unwrap();
        assert!(env.sender_identity().is_none());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            TextEnvelope::parse("{not json"),
            Err(FrameError::InvalidJson(_))
        ));
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(matches!(
            TextEnvelope::parse("[1,2,3]"),
            Err(FrameError::NotAnObject)
        ));
        assert!(matches!(
            TextEnvelope::parse("null"),
            Err(FrameError::NotAnObject)
        ));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(TextEnvelope::parse(""), Err(FrameError::Empty)));
    }

    #[test]
    fn ping_frame_splits_identity_and_timestamp() {
        let frame = ping_frame([7; 16], 1_700_000_000_123.5);
        let decoded = BinaryFrame::decode(&frame);
        assert_eq!(
            decoded.identity.unwrap().as_str(),
            "07070707-0707-0707-0707-070707070707"
        );
        assert_eq!(decoded.ping, Some(1_700_000_000_123.5));
        assert_eq!(&decoded.relay[..], &[7u8; 16][..]);
    }

    #[test]
    fn identity_only_frame_is_relayed_whole() {
        let frame = Bytes::from_static(&[1u8; 16]);
        let decoded = BinaryFrame::decode(&frame);
        assert!(decoded.identity.is_some());
        assert!(decoded.ping.is_none());
        assert_eq!(decoded.relay, frame);
    }

    #[test]
    fn short_frame_has_no_identity() {
        let frame = Bytes::from_static(&[9u8; 10]);
        let decoded = BinaryFrame::decode(&frame);
        assert!(decoded.identity.is_none());
        assert!(decoded.ping.is_none());
        assert_eq!(decoded.relay.len(), 10);
    }

    #[test]
    fn truncated_timestamp_reads_zero() {
        let frame = Bytes::from(vec![3u8; 20]);
        let decoded = BinaryFrame::decode(&frame);
        assert_eq!(decoded.ping, Some(0.0));
        assert_eq!(decoded.relay.len(), 16);
    }

    #[test]
    fn timestamp_is_little_endian() {
        let mut frame = vec![0u8; 16];
        frame.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0xf0, 0x3f]);
        assert!((read_timestamp(&frame) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bytes_past_timestamp_are_ignored() {
        let mut frame = ping_frame([0; 16], 42.0).to_vec();
        frame.extend_from_slice(b"trailing");
        let decoded = BinaryFrame::decode(&Bytes::from(frame));
        assert_eq!(decoded.ping, Some(42.0));
        assert_eq!(decoded.relay.len(), 16);
    }

    #[test]
    fn pong_reply_shape() {
        let json = pong_reply(1234.5).unwrap();
        assert_eq!(json, r#"{"type":"PONG","timestamp":1234.5}"#);
    }

    #[test]
    fn pong_reply_non_finite_is_null() {
        let json = pong_reply(f64::NAN).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "PONG");
        assert!(parsed["timestamp"].is_null());
    }

    #[test]
    fn inbound_kind_labels() {
        assert_eq!(InboundFrame::Text(String::new()).kind(), "text");
        assert_eq!(InboundFrame::Binary(Bytes::new()).kind(), "binary");
    }
}
