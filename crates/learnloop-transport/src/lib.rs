//! Transport layer for LearnLoop.
//!
//! Accepts WebSocket connections and hands each one out as two independent
//! halves: a [`WsReader`] for the inbound flow and a [`WsWriter`] for the
//! outbound flow. The halves never share mutable state, so a connection can
//! be read and written from separate tasks.
//!
//! The upgrade request carries the addressing a connection needs before it
//! is usable: the opaque `sessionId` and the `token` credential, both taken
//! from the query string (see [`Handshake`]).

mod error;
mod websocket;

pub use error::TransportError;
pub use websocket::{
    Frame, Incoming, WebSocketConnection, WebSocketTransport, WsReader,
    WsWriter,
};

use std::fmt;

/// Process-unique id of one accepted WebSocket connection.
///
/// The hub keys its connection map and each session's member list by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Transport settings applied at upgrade time.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest inbound message (and frame) accepted, in bytes.
    /// Anything bigger fails the read and ends the connection.
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: 512,
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Addressing supplied by the client in the upgrade request.
///
/// ```text
/// GET /ws?sessionId=room-42&token=eyJhbGciOi... HTTP/1.1
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// The session to join. Opaque; only checked for presence.
    pub session_id: String,
    /// The credential to verify before the connection is registered.
    pub token: String,
}

/// Why an upgrade request was refused before the WebSocket handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRejection {
    /// No `token` query parameter (HTTP 401).
    MissingToken,
    /// No `sessionId` query parameter (HTTP 400).
    MissingSessionId,
}

impl HandshakeRejection {
    /// The HTTP status code sent back for this rejection.
    pub fn status(self) -> u16 {
        match self {
            Self::MissingToken => 401,
            Self::MissingSessionId => 400,
        }
    }
}

impl fmt::Display for HandshakeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "Missing authorization token"),
            Self::MissingSessionId => write!(f, "Missing session ID"),
        }
    }
}

impl Handshake {
    /// Extracts `token` and `sessionId` from a raw query string.
    ///
    /// The token is checked first, so a request missing both is refused
    /// as unauthorized.
    pub fn from_query(query: Option<&str>) -> Result<Self, HandshakeRejection> {
        let mut token = None;
        let mut session_id = None;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match &*key {
                "token" if !value.is_empty() => token = Some(value.into_owned()),
                "sessionId" if !value.is_empty() => session_id = Some(value.into_owned()),
                _ => {}
            }
        }

        let token = token.ok_or(HandshakeRejection::MissingToken)?;
        let session_id =
            session_id.ok_or(HandshakeRejection::MissingSessionId)?;
        Ok(Self { session_id, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_formats_for_logs() {
        let id = ConnectionId::new(41);
        assert_eq!(format!("{id}"), "conn-41");
        assert_eq!(id.into_inner(), 41);
    }

    #[test]
    fn test_connection_ids_order_by_value() {
        let mut ids = vec![ConnectionId::new(9), ConnectionId::new(2), ConnectionId::new(5)];
        ids.sort();
        assert_eq!(ids, [ConnectionId::new(2), ConnectionId::new(5), ConnectionId::new(9)]);
    }

    #[test]
    fn test_handshake_reads_token_and_session() {
        let hs =
            Handshake::from_query(Some("sessionId=room-1&token=abc.def.ghi"))
                .unwrap();
        assert_eq!(hs.session_id, "room-1");
        assert_eq!(hs.token, "abc.def.ghi");
    }

    #[test]
    fn test_handshake_missing_token_is_unauthorized() {
        let err = Handshake::from_query(Some("sessionId=room-1")).unwrap_err();
        assert_eq!(err, HandshakeRejection::MissingToken);
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn test_handshake_missing_session_is_bad_request() {
        let err = Handshake::from_query(Some("token=abc")).unwrap_err();
        assert_eq!(err, HandshakeRejection::MissingSessionId);
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_handshake_empty_values_count_as_missing() {
        let err =
            Handshake::from_query(Some("token=&sessionId=x")).unwrap_err();
        assert_eq!(err, HandshakeRejection::MissingToken);
        assert!(Handshake::from_query(None).is_err());
    }

    #[test]
    fn test_handshake_percent_decodes_values() {
        let hs =
            Handshake::from_query(Some("token=t&sessionId=room%2042+b"))
                .unwrap();
        assert_eq!(hs.session_id, "room 42 b");
    }

    #[test]
    fn test_handshake_keeps_malformed_escapes() {
        let hs = Handshake::from_query(Some("token=100%&sessionId=a%zzb")).unwrap();
        assert_eq!(hs.token, "100%");
        assert_eq!(hs.session_id, "a%zzb");
    }

    #[test]
    fn test_handshake_decodes_utf8_and_reserved_characters() {
        let hs = Handshake::from_query(Some(
            "token=a%2Bb%3Dc%26d&sessionId=caf%C3%A9",
        ))
        .unwrap();
        assert_eq!(hs.token, "a+b=c&d");
        assert_eq!(hs.session_id, "café");
    }
}
