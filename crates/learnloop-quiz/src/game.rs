//! The quiz state machine.
//!
//! [`QuizGame`] is plain data plus methods: no tasks, no channels, no
//! clock of its own. Every method that needs the time takes `now`, and
//! every method that needs the live participant count takes `connected`.
//! That keeps it fully testable with ordinary `#[test]`s; the actor in
//! [`crate::actor`] supplies both and serializes access.
//!
//! ```text
//!              start            advance             advance (last)
//! NotStarted ───────→ Loaded ─────────→ Question(i) ──────────────→ Finished
//!                                        │     ▲
//!                                        └─────┘ advance
//! ```
//!
//! Within `Question(i)` the question itself is `InProgress` until either
//! every connected participant has answered (`Ended`) or its timer fires
//! (`TimedOut`).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use learnloop_protocol::{
    Answer, AnswerId, AnswerStat, Correctness, Envelope, FreeTextAnswerStat,
    PlayerStat, Question, QuestionId, QuestionStartedMessage,
    QuestionStatsMessage, QuestionStatus, QuestionType, Quiz, QuizAction,
    QuizId, QuizInfo, QuizStatsMessage, ServerMessage,
};
use tokio::time::Instant;

use crate::{QuizConfig, QuizError};

/// The armed timer for the open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionTimer {
    pub question_id: QuestionId,
    pub deadline: Instant,
}

/// Per-question aggregates.
#[derive(Debug)]
struct QuestionRecord {
    status: QuestionStatus,
    answers: BTreeMap<AnswerId, AnswerStat>,
    free_text: Vec<FreeTextAnswerStat>,
    /// Graded result per login. Presence means "already answered".
    results: BTreeMap<String, Correctness>,
}

impl QuestionRecord {
    fn new() -> Self {
        Self {
            status: QuestionStatus::InProgress,
            answers: BTreeMap::new(),
            free_text: Vec::new(),
            results: BTreeMap::new(),
        }
    }

    /// The stat for `answer`, created on first use, with its true
    /// correctness filled in.
    fn answer_stat(&mut self, answer: &Answer) -> &mut AnswerStat {
        let stat = self.answers.entry(answer.id).or_insert(AnswerStat {
            answer_id: answer.id,
            count: 0,
            correct: answer.correct,
        });
        stat.correct = answer.correct;
        stat
    }
}

#[derive(Debug, Clone)]
struct ActiveQuestion {
    question: Question,
    started_at: Instant,
}

/// A read-only view of a game, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    pub quiz_id: Option<QuizId>,
    pub current_question_index: i64,
    pub active_question: Option<QuestionId>,
    pub timer: Option<QuestionTimer>,
    pub player_stats: BTreeMap<String, PlayerStat>,
}

/// One session's quiz run.
pub struct QuizGame {
    config: QuizConfig,
    quiz: Option<Arc<Quiz>>,
    started_by: String,
    started_at: Option<Instant>,
    /// `None` until the first question; never above the question count.
    index: Option<usize>,
    question_stats: HashMap<QuestionId, QuestionRecord>,
    player_stats: BTreeMap<String, PlayerStat>,
    active: Option<ActiveQuestion>,
    timer: Option<QuestionTimer>,
}

impl QuizGame {
    pub fn new(config: QuizConfig) -> Self {
        Self {
            config,
            quiz: None,
            started_by: String::new(),
            started_at: None,
            index: None,
            question_stats: HashMap::new(),
            player_stats: BTreeMap::new(),
            active: None,
            timer: None,
        }
    }

    // -----------------------------------------------------------------------
    // Progression
    // -----------------------------------------------------------------------

    /// Loads `quiz` and resets every per-quiz counter. Produces no message;
    /// the first question is only asked by [`advance`](Self::advance).
    pub fn start(&mut self, quiz: Arc<Quiz>, starter: &str, now: Instant) {
        if let Some(timer) = self.timer.take() {
            tracing::debug!(question_id = timer.question_id, "question timer retired by restart");
        }
        tracing::info!(quiz_id = quiz.id, starter, "quiz started");

        self.quiz = Some(quiz);
        self.started_by = starter.to_owned();
        self.started_at = Some(now);
        self.index = None;
        self.question_stats.clear();
        self.player_stats.clear();
        self.active = None;
    }

    /// Moves to the next question, or past the last one.
    ///
    /// Returns a question-started message while questions remain and the
    /// quiz summary afterwards. Once finished, every further call returns
    /// the summary again.
    pub fn advance(&mut self, now: Instant) -> Result<ServerMessage, QuizError> {
        let quiz = self.quiz.clone().ok_or(QuizError::NotStarted)?;
        let next = self.index.map_or(0, |i| i + 1).min(quiz.questions.len());
        self.index = Some(next);

        if let Some(timer) = self.timer.take() {
            tracing::debug!(question_id = timer.question_id, "question timer retired");
        }

        let Some(question) = quiz.questions.get(next) else {
            self.active = None;
            tracing::info!(
                quiz_id = quiz.id,
                players = self.player_stats.len(),
                "quiz finished"
            );
            return Ok(self.summary(&quiz).into());
        };

        let redacted = question.redacted();
        self.active = Some(ActiveQuestion {
            question: redacted.clone(),
            started_at: now,
        });
        self.timer = Some(QuestionTimer {
            question_id: question.id,
            deadline: now + self.config.question_timeout,
        });
        self.question_stats
            .entry(question.id)
            .or_insert_with(QuestionRecord::new);
        tracing::debug!(
            question_id = question.id,
            number = next + 1,
            timeout = ?self.config.question_timeout,
            "question started, timer armed"
        );

        Ok(QuestionStartedMessage {
            envelope: Envelope::quiz(QuizAction::QuestionStarted),
            quiz_info: QuizInfo {
                id: quiz.id,
                title: quiz.title.clone(),
                kind: quiz.kind,
                url: quiz.url.clone(),
                started_by: self.started_by.clone(),
            },
            question_type: question.kind,
            question: redacted,
            question_number: next + 1,
            question_count: quiz.questions.len(),
            timeout: self.config.advertised_timeout_secs,
        }
        .into())
    }

    /// Closes the open question if its timer is due.
    ///
    /// Participants who never answered get no result. Returns the
    /// question-ended statistics, with every answer's true correctness
    /// filled in, or `None` if no timer is due.
    pub fn expire(
        &mut self,
        now: Instant,
        connected: usize,
    ) -> Option<QuestionStatsMessage> {
        let timer = self.timer?;
        if now < timer.deadline {
            return None;
        }
        self.timer = None;
        self.active = None;

        let quiz = self.quiz.clone()?;
        let question = quiz.question(timer.question_id)?;
        let record = self
            .question_stats
            .entry(question.id)
            .or_insert_with(QuestionRecord::new);
        if record.status == QuestionStatus::InProgress {
            record.status = QuestionStatus::TimedOut;
        }
        for answer in &question.answers {
            record.answer_stat(answer);
        }
        tracing::info!(
            question_id = question.id,
            answered = record.results.len(),
            connected,
            "question timed out"
        );

        Some(self.stats_message(question.id, QuizAction::QuestionEnded, connected))
    }

    // -----------------------------------------------------------------------
    // Submissions
    // -----------------------------------------------------------------------

    /// Grades a multiple-choice submission.
    ///
    /// Correct iff `selected` is exactly the set of correct answers.
    pub fn submit_multiple_choice(
        &mut self,
        question_id: QuestionId,
        selected: &[AnswerId],
        login: &str,
        connected: usize,
    ) -> Result<QuestionStatsMessage, QuizError> {
        let (quiz, index) =
            self.open_question(question_id, QuestionType::MultipleChoice)?;
        let question = &quiz.questions[index];
        if self.timer.is_none() {
            return Ok(self.closed_snapshot(question.id, connected));
        }
        self.ensure_unanswered(question.id, login)?;
        if let Some(bad) = selected.iter().find(|id| question.answer(**id).is_none()) {
            return Err(QuizError::InvalidAnswerId(*bad));
        }

        let record = self
            .question_stats
            .entry(question.id)
            .or_insert_with(QuestionRecord::new);
        let mut correct = true;
        for answer in &question.answers {
            let picked = selected.contains(&answer.id);
            let stat = record.answer_stat(answer);
            if picked {
                stat.count += 1;
            }
            if picked != (answer.correct == Correctness::Correct) {
                correct = false;
            }
        }

        Ok(self.grade(question.id, login, correct, connected))
    }

    /// Grades a free-text submission: any non-blank text is correct.
    pub fn submit_free_text(
        &mut self,
        question_id: QuestionId,
        texts: &[String],
        login: &str,
        connected: usize,
    ) -> Result<QuestionStatsMessage, QuizError> {
        let (quiz, index) = self.open_question(question_id, QuestionType::FreeText)?;
        let question = &quiz.questions[index];
        if self.timer.is_none() {
            return Ok(self.closed_snapshot(question.id, connected));
        }
        self.ensure_unanswered(question.id, login)?;

        let record = self
            .question_stats
            .entry(question.id)
            .or_insert_with(QuestionRecord::new);
        let mut any_text = false;
        for text in texts.iter().filter(|t| !t.trim().is_empty()) {
            any_text = true;
            record.free_text.push(FreeTextAnswerStat {
                text: text.clone(),
                login: login.to_owned(),
            });
        }

        Ok(self.grade(question.id, login, any_text, connected))
    }

    fn open_question(
        &self,
        question_id: QuestionId,
        expected: QuestionType,
    ) -> Result<(Arc<Quiz>, usize), QuizError> {
        let quiz = self.quiz.clone().ok_or(QuizError::NotStarted)?;
        let index = self.index.ok_or(QuizError::NotStarted)?;
        let current = quiz.questions.get(index).ok_or(QuizError::Ended)?;
        if current.id != question_id {
            return Err(QuizError::QuestionMismatch {
                submitted: question_id,
                current: current.id,
            });
        }
        if current.kind != expected {
            return Err(QuizError::WrongType {
                question_id,
                expected: type_label(expected),
            });
        }
        Ok((quiz, index))
    }

    fn ensure_unanswered(
        &self,
        question_id: QuestionId,
        login: &str,
    ) -> Result<(), QuizError> {
        let answered = self
            .question_stats
            .get(&question_id)
            .is_some_and(|r| r.results.contains_key(login));
        if answered {
            return Err(QuizError::AlreadyAnswered {
                login: login.to_owned(),
                question_id,
            });
        }
        Ok(())
    }

    /// Records the result, updates the player's tally, and closes the
    /// question once every connected participant has answered.
    fn grade(
        &mut self,
        question_id: QuestionId,
        login: &str,
        correct: bool,
        connected: usize,
    ) -> QuestionStatsMessage {
        let verdict = if correct {
            Correctness::Correct
        } else {
            Correctness::Incorrect
        };
        let record = self
            .question_stats
            .entry(question_id)
            .or_insert_with(QuestionRecord::new);
        record.results.insert(login.to_owned(), verdict);

        let tally = self
            .player_stats
            .entry(login.to_owned())
            .or_insert_with(|| PlayerStat::new(login));
        tally.count_answered += 1;
        if correct {
            tally.count_correct += 1;
        }

        let answered = record.results.len();
        let action = if answered >= connected {
            record.status = QuestionStatus::Ended;
            self.timer = None;
            self.active = None;
            tracing::debug!(question_id, answered, "all participants answered, question ended");
            QuizAction::QuestionEnded
        } else {
            QuizAction::QuestionStats
        };

        self.stats_message(question_id, action, connected)
    }

    /// Answer to a submission that arrived after the question closed:
    /// not graded, just the final statistics.
    fn closed_snapshot(
        &mut self,
        question_id: QuestionId,
        connected: usize,
    ) -> QuestionStatsMessage {
        let record = self
            .question_stats
            .entry(question_id)
            .or_insert_with(QuestionRecord::new);
        if record.status == QuestionStatus::InProgress {
            record.status = QuestionStatus::TimedOut;
        }
        self.stats_message(question_id, QuizAction::QuestionEnded, connected)
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn stats_message(
        &self,
        question_id: QuestionId,
        action: QuizAction,
        connected: usize,
    ) -> QuestionStatsMessage {
        let (status, answered_count, answers_stats, free_text_answers_stats) =
            match self.question_stats.get(&question_id) {
                Some(r) => (
                    r.status,
                    r.results.len(),
                    r.answers.clone(),
                    r.free_text.clone(),
                ),
                None => (QuestionStatus::InProgress, 0, BTreeMap::new(), Vec::new()),
            };

        QuestionStatsMessage {
            envelope: Envelope::quiz(action),
            question_id,
            status,
            learners_count: connected,
            answered_count,
            answers_stats,
            free_text_answers_stats,
        }
    }

    fn summary(&self, quiz: &Quiz) -> QuizStatsMessage {
        QuizStatsMessage {
            envelope: Envelope::quiz(QuizAction::QuizStats),
            quiz_id: quiz.id,
            learners_count: self.player_stats.len(),
            player_stats: self.player_stats.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Whether a quiz has been loaded with [`start`](Self::start).
    pub fn is_loaded(&self) -> bool {
        self.quiz.is_some()
    }

    /// -1 before the first question, then the 0-based position; equal to
    /// the question count once the quiz is finished.
    pub fn current_question_index(&self) -> i64 {
        self.index.map_or(-1, |i| i as i64)
    }

    pub fn timer(&self) -> Option<QuestionTimer> {
        self.timer
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.map(|t| t.deadline)
    }

    /// The redacted open question and when it was asked.
    pub fn active_question(&self) -> Option<(&Question, Instant)> {
        self.active.as_ref().map(|a| (&a.question, a.started_at))
    }

    pub fn started_by(&self) -> &str {
        &self.started_by
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn player_stats(&self) -> &BTreeMap<String, PlayerStat> {
        &self.player_stats
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            quiz_id: self.quiz.as_ref().map(|q| q.id),
            current_question_index: self.current_question_index(),
            active_question: self.active.as_ref().map(|a| a.question.id),
            timer: self.timer,
            player_stats: self.player_stats.clone(),
        }
    }
}

fn type_label(kind: QuestionType) -> &'static str {
    match kind {
        QuestionType::MultipleChoice => "multiple-choice",
        QuestionType::FreeText => "free-text",
    }
}
