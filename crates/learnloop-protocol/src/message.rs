//! Wire messages.
//!
//! Every message is a flat JSON object. The common header ([`Envelope`])
//! is flattened into each message struct with `#[serde(flatten)]`, so a
//! chat message looks like:
//!
//! ```json
//! { "type": 2, "from": { "type": 1, "id": "alice" }, "to": [], "msg": "hi" }
//! ```
//!
//! and not `{ "envelope": { "type": 2 }, ... }`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::model::{
    AnswerId, AnswerStat, FreeTextAnswerStat, PlayerStat, Question,
    QuestionId, QuestionStatus, QuestionType, QuizId, QuizType,
};

wire_enum! {
    /// The outer message kind, `type` on the wire.
    pub enum MessageKind: u8 {
        UserConnected = 0,
        UserDisconnected = 1,
        Chat = 2,
        Notification = 3,
        Quiz = 4,
    }
}

wire_enum! {
    /// Sub-kind of a quiz message, `action` on the wire.
    pub enum QuizAction: u8 {
        Start = 0,
        QuestionStarted = 1,
        LearnerAnswer = 2,
        QuestionStats = 3,
        QuestionEnded = 4,
        NextQuestion = 5,
        QuizStats = 6,
        LearnerAnswerFreeText = 7,
    }
}

impl QuizAction {
    /// Actions only the server may produce.
    pub fn is_server_only(self) -> bool {
        matches!(
            self,
            Self::QuestionStarted
                | Self::QuestionStats
                | Self::QuestionEnded
                | Self::QuizStats
        )
    }
}

wire_enum! {
    /// What a [`Recipient`] id names.
    pub enum RecipientKind: u8 {
        Session = 0,
        Learner = 1,
    }
}

impl Default for RecipientKind {
    fn default() -> Self {
        Self::Session
    }
}

/// A session or a learner, used in `from` / `to` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(rename = "type")]
    pub kind: RecipientKind,
    pub id: String,
}

impl Recipient {
    pub fn session(id: impl Into<String>) -> Self {
        Self {
            kind: RecipientKind::Session,
            id: id.into(),
        }
    }

    pub fn learner(login: impl Into<String>) -> Self {
        Self {
            kind: RecipientKind::Learner,
            id: login.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The header fields every message carries inline.
///
/// `action`, `timestamp` and `clientId` are omitted from the JSON when
/// unset, matching what clients send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<QuizAction>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Envelope {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            action: None,
            timestamp: 0,
            client_id: String::new(),
        }
    }

    /// A quiz-kind envelope with the given action.
    pub fn quiz(action: QuizAction) -> Self {
        Self {
            action: Some(action),
            ..Self::new(MessageKind::Quiz)
        }
    }
}

// ---------------------------------------------------------------------------
// Presence and chat
// ---------------------------------------------------------------------------

/// User connected / disconnected. A client sends the connected form to
/// set its display login (`from.id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub from: Recipient,
    #[serde(default)]
    pub to: Vec<Recipient>,
}

impl PresenceMessage {
    pub fn connected(login: &str, session_id: &str) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::UserConnected),
            from: Recipient::learner(login),
            to: vec![Recipient::session(session_id)],
        }
    }

    pub fn disconnected(login: &str, session_id: &str) -> Self {
        Self {
            envelope: Envelope::new(MessageKind::UserDisconnected),
            ..Self::connected(login, session_id)
        }
    }
}

/// A free-form chat line. The server overwrites `from` with the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub from: Recipient,
    #[serde(default)]
    pub to: Vec<Recipient>,
    pub msg: String,
}

// ---------------------------------------------------------------------------
// Quiz: client → server
// ---------------------------------------------------------------------------

/// Start a quiz, or move to its next question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizControl {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub quiz_id: QuizId,
}

/// A multiple-choice submission: the selected answer ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub question_id: QuestionId,
    #[serde(default)]
    pub answers: Vec<AnswerId>,
}

/// A free-text submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeTextAnswerMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub question_id: QuestionId,
    #[serde(default)]
    pub answers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Quiz: server → client
// ---------------------------------------------------------------------------

/// Quiz metadata repeated in every question-started message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizInfo {
    pub id: QuizId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: QuizType,
    pub url: String,
    pub started_by: String,
}

/// A new question is open. `question` is always redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStartedMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub quiz_info: QuizInfo,
    pub question: Question,
    pub question_type: QuestionType,
    /// 1-based position of `question` in the quiz.
    pub question_number: usize,
    pub question_count: usize,
    /// Advertised answer window, in seconds.
    pub timeout: u64,
}

/// Aggregated statistics for one question.
///
/// Sent with action `QuestionStats` while the question is open and
/// `QuestionEnded` once it has closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStatsMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub question_id: QuestionId,
    pub status: QuestionStatus,
    pub learners_count: usize,
    pub answered_count: usize,
    #[serde(deserialize_with = "answer_stats_by_id")]
    pub answers_stats: BTreeMap<AnswerId, AnswerStat>,
    pub free_text_answers_stats: Vec<FreeTextAnswerStat>,
}

/// Flattened structs buffer their input, which loses serde_json's
/// numeric map-key handling, so the keys are parsed here.
fn answer_stats_by_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<AnswerId, AnswerStat>, D::Error> {
    BTreeMap::<String, AnswerStat>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, stat)| {
            key.parse::<AnswerId>()
                .map(|id| (id, stat))
                .map_err(de::Error::custom)
        })
        .collect()
}

/// The final per-player summary, sent once the last question is passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStatsMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub quiz_id: QuizId,
    pub learners_count: usize,
    pub player_stats: BTreeMap<String, PlayerStat>,
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Everything the server sends to clients.
///
/// `#[serde(untagged)]` serializes each variant as its inner struct, so
/// the JSON is exactly the flat message; the envelope inside already says
/// which kind it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Presence(PresenceMessage),
    Chat(ChatMessage),
    QuestionStarted(QuestionStartedMessage),
    QuestionStats(QuestionStatsMessage),
    QuizStats(QuizStatsMessage),
}

impl ServerMessage {
    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Presence(m) => &m.envelope,
            Self::Chat(m) => &m.envelope,
            Self::QuestionStarted(m) => &m.envelope,
            Self::QuestionStats(m) => &m.envelope,
            Self::QuizStats(m) => &m.envelope,
        }
    }

    /// The quiz action, if this is a quiz message.
    pub fn action(&self) -> Option<QuizAction> {
        self.envelope().action
    }
}

impl From<PresenceMessage> for ServerMessage {
    fn from(m: PresenceMessage) -> Self {
        Self::Presence(m)
    }
}

impl From<ChatMessage> for ServerMessage {
    fn from(m: ChatMessage) -> Self {
        Self::Chat(m)
    }
}

impl From<QuestionStartedMessage> for ServerMessage {
    fn from(m: QuestionStartedMessage) -> Self {
        Self::QuestionStarted(m)
    }
}

impl From<QuestionStatsMessage> for ServerMessage {
    fn from(m: QuestionStatsMessage) -> Self {
        Self::QuestionStats(m)
    }
}

impl From<QuizStatsMessage> for ServerMessage {
    fn from(m: QuizStatsMessage) -> Self {
        Self::QuizStats(m)
    }
}
