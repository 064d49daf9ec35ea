//! Codec trait and the JSON implementation.
//!
//! A "codec" (coder/decoder) converts between Rust types and what travels
//! in a WebSocket text frame. The hub encodes each outbound message exactly
//! once through a [`Codec`] and fans the resulting text out to every
//! recipient, so the encoding cost does not grow with the audience.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that encodes values to frame text and decodes frame bytes back.
///
/// `Send + Sync + 'static` because the codec lives inside the hub task and
/// is shared with every connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into the text of one frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes one frame's bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do not
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`), the format browser
/// clients speak.
///
/// ```rust
/// use learnloop_protocol::{Codec, JsonCodec, Recipient};
///
/// let codec = JsonCodec;
/// let text = codec.encode(&Recipient::learner("alice")).unwrap();
/// assert_eq!(text, r#"{"type":1,"id":"alice"}"#);
///
/// let back: Recipient = codec.decode(text.as_bytes()).unwrap();
/// assert_eq!(back.id, "alice");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Answer, Correctness};

    #[test]
    fn test_encode_produces_compact_json() {
        let answer = Answer {
            id: 3,
            text: "Paris".into(),
            url: String::new(),
            correct: Correctness::Correct,
        };
        let text = JsonCodec.encode(&answer).unwrap();
        assert!(!text.contains('\n'));
        assert!(text.contains(r#""title":"Paris""#));
    }

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Answer, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
