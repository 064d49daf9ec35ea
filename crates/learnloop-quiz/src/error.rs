//! Error types for the quiz layer.

use std::path::PathBuf;

use learnloop_protocol::{AnswerId, ProtocolError, QuestionId};

/// Errors that can occur while running a quiz or loading quiz content.
///
/// The engine variants are precondition failures: the submission or
/// request is refused and the game state is left exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    /// No quiz has been started, or no question has been asked yet.
    #[error("quiz not started")]
    NotStarted,

    /// Every question has been asked already.
    #[error("quiz ended")]
    Ended,

    /// The submission names a question other than the open one.
    #[error("question mismatch: {submitted} is not the current question {current}")]
    QuestionMismatch {
        submitted: QuestionId,
        current: QuestionId,
    },

    /// A multiple-choice answer for a free-text question, or vice versa.
    #[error("wrong type: question {question_id} is not a {expected} question")]
    WrongType {
        question_id: QuestionId,
        expected: &'static str,
    },

    /// A selected id does not belong to the open question.
    #[error("invalid answer id: {0}")]
    InvalidAnswerId(AnswerId),

    /// The participant already has a graded answer for this question.
    #[error("already answered: {login} already answered question {question_id}")]
    AlreadyAnswered {
        login: String,
        question_id: QuestionId,
    },

    /// The game actor has stopped and can no longer take commands.
    #[error("quiz game is unavailable")]
    Unavailable,

    /// Reading quiz content from disk failed.
    #[error("failed to read quiz content at {path}: {source}")]
    CatalogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Quiz content did not parse.
    #[error("invalid quiz content in {origin}: {source}")]
    CatalogParse {
        origin: String,
        #[source]
        source: ProtocolError,
    },
}
