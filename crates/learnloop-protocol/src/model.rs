//! Quiz content and statistics types.
//!
//! Content ([`Quiz`], [`Question`], [`Answer`]) is immutable once loaded:
//! the engine only ever reads it, and hands clients a *redacted* copy of
//! the active question. Statistics ([`AnswerStat`], [`PlayerStat`], ...)
//! are the aggregates the engine builds while a quiz runs.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

pub type QuizId = u64;
pub type QuestionId = u64;
pub type AnswerId = u64;

wire_enum! {
    /// How a whole quiz is presented. Carried in `QuizInfo.type`.
    pub enum QuizType: u8 {
        MultipleChoice = 0,
        FreeText = 1,
    }
}

wire_enum! {
    /// The kind of a single question; decides which answer message is valid.
    pub enum QuestionType: u8 {
        MultipleChoice = 0,
        FreeText = 1,
    }
}

wire_enum! {
    /// Whether an answer (or a player's result) is right.
    ///
    /// `Unknown` is what clients see on a question that is still open.
    pub enum Correctness: i8 {
        Unknown = -1,
        Incorrect = 0,
        Correct = 1,
    }
}

/// Content files leave `correct` out for wrong answers.
impl Default for Correctness {
    fn default() -> Self {
        Self::Incorrect
    }
}

wire_enum! {
    /// Lifecycle of one question's statistics.
    pub enum QuestionStatus: u8 {
        /// Open, accepting answers.
        InProgress = 0,
        /// Closed by the timer before everyone answered.
        TimedOut = 1,
        /// Closed because every connected participant answered.
        Ended = 2,
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// One selectable answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    /// The answer text (`title` on the wire).
    #[serde(rename = "title")]
    pub text: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub correct: Correctness,
}

/// A single quiz question with its ordered answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    /// The question text (`question` on the wire).
    #[serde(rename = "question")]
    pub text: String,
    #[serde(rename = "questionType")]
    pub kind: QuestionType,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl Question {
    /// A copy with every answer's correctness hidden, safe to send to
    /// participants while the question is open.
    pub fn redacted(&self) -> Question {
        let mut copy = self.clone();
        for answer in &mut copy.answers {
            answer.correct = Correctness::Unknown;
        }
        copy
    }

    /// Looks up an answer by id.
    pub fn answer(&self, id: AnswerId) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id == id)
    }
}

/// A complete quiz: metadata plus the ordered question list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    #[serde(rename = "type")]
    pub kind: QuizType,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Parses quiz content from its JSON form.
    pub fn from_json(json: &str) -> Result<Quiz, ProtocolError> {
        serde_json::from_str(json).map_err(ProtocolError::Decode)
    }

    /// Looks up a question by id.
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// How many participants picked one answer, and whether it was right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerStat {
    pub answer_id: AnswerId,
    pub count: u32,
    pub correct: Correctness,
}

/// One free-text submission, kept in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTextAnswerStat {
    pub text: String,
    pub login: String,
}

/// A participant's running tally across the whole quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStat {
    pub player_login: String,
    pub count_answered: u32,
    pub count_correct: u32,
}

impl PlayerStat {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            player_login: login.into(),
            count_answered: 0,
            count_correct: 0,
        }
    }
}
