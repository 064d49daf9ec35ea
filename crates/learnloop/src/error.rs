//! Error types for the server crate.

use learnloop_protocol::{ProtocolError, QuizId};
use learnloop_quiz::QuizError;
use learnloop_session::SessionError;
use learnloop_transport::TransportError;

/// Why one inbound command could not be carried out.
///
/// Every variant is scoped to the command that caused it: the connection
/// and its session keep running.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The quiz engine refused the request.
    #[error(transparent)]
    Quiz(#[from] QuizError),

    /// An outbound message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Start or next named a quiz the catalog does not have.
    #[error("unknown quiz id: {0}")]
    UnknownQuiz(QuizId),

    /// A client sent a message kind only the server may produce.
    #[error("{0} can only be sent by the server")]
    ServerOnly(&'static str),

    /// The connection tried to act before sending its join message.
    #[error("connection has not joined the session yet")]
    NotJoined,

    /// The hub task has stopped.
    #[error("hub is unavailable")]
    HubUnavailable,
}

/// Anything that can stop the server or one connection's lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum LearnLoopError {
    /// Bind, accept, upgrade, or socket I/O.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame that could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Credential verification failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A quiz engine or catalog error.
    #[error(transparent)]
    Quiz(#[from] QuizError),

    /// A command could not be dispatched.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A configuration value did not parse.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::UpgradeFailed("no key header".into());
        let top: LearnLoopError = err.into();
        assert!(matches!(top, LearnLoopError::Transport(_)));
        assert_eq!(top.to_string(), "upgrade failed: no key header");
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthFailed("nope".into());
        let top: LearnLoopError = err.into();
        assert!(matches!(top, LearnLoopError::Session(_)));
    }

    #[test]
    fn test_quiz_error_keeps_its_phrase_through_dispatch() {
        let err: DispatchError = QuizError::Ended.into();
        assert_eq!(err.to_string(), "quiz ended");
        let top: LearnLoopError = err.into();
        assert_eq!(top.to_string(), "quiz ended");
    }

    #[test]
    fn test_server_only_message() {
        let err = DispatchError::ServerOnly("quiz-stats");
        assert_eq!(err.to_string(), "quiz-stats can only be sent by the server");
    }
}
