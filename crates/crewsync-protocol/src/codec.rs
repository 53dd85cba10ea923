//! Codec trait and the JSON implementation.
//!
//! The gateway never calls `serde_json` directly. It goes through a
//! [`Codec`], so the frame encoding can be swapped without touching the
//! connection handler.

use serde::{de::DeserializeOwned, Serialize};

use crate::{ClientEvent, ProtocolError, RawFrame};

/// Encodes outbound values to bytes and decodes inbound bytes.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into one frame.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes one frame.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes a client frame into its event and optional ack id.
    ///
    /// On a payload error the ack id is still returned when the envelope
    /// itself parsed, so the client's callback can be rejected instead
    /// of left hanging.
    fn decode_client(
        &self,
        data: &[u8],
    ) -> Result<(ClientEvent, Option<u64>), (ProtocolError, Option<u64>)> {
        let raw: RawFrame = self.decode(data).map_err(|e| (e, None))?;
        let ack = raw.ack;
        ClientEvent::from_raw(&raw.event, raw.data)
            .map(|event| (event, ack))
            .map_err(|e| (e, ack))
    }
}

/// A [`Codec`] that uses JSON text frames.
///
/// ```rust
/// use crewsync_protocol::{ClientEvent, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame = br#"{"event":"broadcastState","data":{"battleId":"b1"},"ack":4}"#;
/// let (event, ack) = codec.decode_client(frame).unwrap();
/// assert_eq!(event.name(), "broadcastState");
/// assert_eq!(ack, Some(4));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlayerId, ServerEvent, ServerFrame, Winner};

    #[test]
    fn test_decode_client_garbage_has_no_ack() {
        let err = JsonCodec.decode_client(b"not json at all").unwrap_err();
        assert!(matches!(err, (ProtocolError::Decode(_), None)));
    }

    #[test]
    fn test_decode_client_bad_payload_keeps_ack() {
        let frame = br#"{"event":"respondSyncInvitation","data":{"accepted":1},"ack":12}"#;
        let err = JsonCodec.decode_client(frame).unwrap_err();
        assert!(matches!(err, (ProtocolError::Decode(_), Some(12))));
    }

    #[test]
    fn test_decode_client_unknown_event_keeps_ack() {
        let frame = br#"{"event":"fly","ack":2}"#;
        let err = JsonCodec.decode_client(frame).unwrap_err();
        assert!(matches!(err, (ProtocolError::UnknownEvent(_), Some(2))));
    }

    #[test]
    fn test_encoded_event_is_valid_utf8_json() {
        let event = ServerEvent::Winner(Winner { player_id: PlayerId::new("p9") });
        let bytes = JsonCodec.encode(&event).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("battle:winner"));

        let back: ServerFrame = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(back, ServerFrame::Event(event));
    }
}
