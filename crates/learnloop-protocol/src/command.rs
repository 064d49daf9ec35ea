//! Inbound commands and their two-phase decode.
//!
//! A client frame is decoded in two steps:
//!
//! 1. Read only `type` and `action` to learn which message this is.
//!    Unknown values fail here with [`ProtocolError::UnknownKind`] or
//!    [`ProtocolError::UnknownAction`], never silently ignored.
//! 2. Decode the whole frame into the struct for that (kind, action) pair.
//!
//! The frame is parsed into a `serde_json::Value` once and both steps read
//! from it.

use serde::Deserialize;
use serde_json::Value;

use crate::ProtocolError;
use crate::message::{
    AnswerMessage, ChatMessage, FreeTextAnswerMessage, MessageKind,
    PresenceMessage, QuestionStartedMessage, QuestionStatsMessage,
    QuizAction, QuizControl, QuizStatsMessage, ServerMessage,
};

/// Every operation a client can request, with its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set the sender's display login (`from.id`).
    Join(PresenceMessage),
    /// The client says it is leaving. Informational only.
    Leave(PresenceMessage),
    Chat(ChatMessage),
    StartQuiz(QuizControl),
    NextQuestion(QuizControl),
    Answer(AnswerMessage),
    FreeTextAnswer(FreeTextAnswerMessage),
    /// A well-formed message of a kind only the server may send. Decoded
    /// so the schema is checked, then refused at execution.
    ServerOnly(ServerMessage),
}

/// The fields needed to pick a variant. `action` defaults to 0 (start)
/// when absent.
#[derive(Deserialize)]
struct Discriminant {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    action: u8,
}

impl Command {
    /// Decodes one inbound frame.
    pub fn decode(data: &[u8]) -> Result<Command, ProtocolError> {
        let value: Value =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        let head = Discriminant::deserialize(&value).map_err(ProtocolError::Decode)?;

        let kind = MessageKind::try_from(head.kind)
            .map_err(ProtocolError::UnknownKind)?;

        let command = match kind {
            MessageKind::UserConnected => Command::Join(payload(value)?),
            MessageKind::UserDisconnected => Command::Leave(payload(value)?),
            MessageKind::Chat => Command::Chat(payload(value)?),
            MessageKind::Notification => {
                return Err(ProtocolError::InvalidMessage(
                    "notifications are not accepted from clients".into(),
                ));
            }
            MessageKind::Quiz => {
                let action = QuizAction::try_from(head.action)
                    .map_err(ProtocolError::UnknownAction)?;
                decode_quiz(action, value)?
            }
        };
        Ok(command)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::Chat(_) => "chat",
            Self::StartQuiz(_) => "quiz-start",
            Self::NextQuestion(_) => "quiz-next",
            Self::Answer(_) => "answer",
            Self::FreeTextAnswer(_) => "answer-free-text",
            Self::ServerOnly(_) => "server-only",
        }
    }
}

fn decode_quiz(action: QuizAction, value: Value) -> Result<Command, ProtocolError> {
    let command = match action {
        QuizAction::Start => Command::StartQuiz(payload(value)?),
        QuizAction::NextQuestion => Command::NextQuestion(payload(value)?),
        QuizAction::LearnerAnswer => Command::Answer(payload(value)?),
        QuizAction::LearnerAnswerFreeText => {
            Command::FreeTextAnswer(payload(value)?)
        }
        QuizAction::QuestionStarted => Command::ServerOnly(
            payload::<QuestionStartedMessage>(value)?.into(),
        ),
        QuizAction::QuestionStats | QuizAction::QuestionEnded => {
            Command::ServerOnly(payload::<QuestionStatsMessage>(value)?.into())
        }
        QuizAction::QuizStats => {
            Command::ServerOnly(payload::<QuizStatsMessage>(value)?.into())
        }
    };
    Ok(command)
}

fn payload<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ProtocolError> {
    T::deserialize(value).map_err(ProtocolError::Decode)
}
