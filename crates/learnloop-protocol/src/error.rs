//! Error types for the protocol layer.
//!
//! Each crate in LearnLoop defines its own error enum. A `ProtocolError`
//! always means the bytes themselves were the problem: they did not parse,
//! or they parsed into a (kind, action) pair the server does not accept.
//! Nothing in here ever tears a connection down; the caller logs and moves
//! on to the next message.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into text).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing required field,
    /// or a field of the wrong type.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope's `type` is not one of the known message kinds.
    #[error("unknown message type: {0}")]
    UnknownKind(u8),

    /// A quiz message carried an `action` outside the known set.
    #[error("unknown quiz message action: {0}")]
    UnknownAction(u8),

    /// The message is well-formed but not acceptable from a client.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
