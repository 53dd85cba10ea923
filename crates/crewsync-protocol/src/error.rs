//! Error types for the protocol layer.
//!
//! These cover getting a frame on or off the wire. Rejections of a
//! well-formed action are not protocol errors; they travel to the client
//! as an [`ErrorCode`](crate::ErrorCode) inside a `battle:error` event.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing required field,
    /// or a field of the wrong type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame named an event this server does not handle.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}
