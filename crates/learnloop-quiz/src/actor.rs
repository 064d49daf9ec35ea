//! Per-session game actor.
//!
//! Every mutation of a session's [`QuizGame`] goes through one Tokio task.
//! Participants' submissions arrive as commands on an mpsc channel and the
//! question timer is just another branch of the same `select!`, so a
//! submission and a timeout can never interleave.
//!
//! ```text
//! connection tasks ──cmd──→ ┌──────────────┐ ──publish──→ SessionLink
//!                           │  GameActor   │
//! question deadline ──────→ │  (QuizGame)  │ ←─connected_count()──┘
//!                           └──────────────┘
//! ```

use std::sync::Arc;

use learnloop_protocol::{
    AnswerId, QuestionId, QuestionStatsMessage, Quiz, ServerMessage,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::{GameSnapshot, QuizConfig, QuizError, QuizGame};

/// Sender identity used for messages the engine produces on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// What the game needs from the session it belongs to.
///
/// Implemented by the hub. `connected_count` is read every time an answer
/// is graded, never cached, so disconnects change when a question closes.
pub trait SessionLink: Send + Sync + 'static {
    /// Participants currently connected to the session.
    fn connected_count(&self) -> usize;

    /// Delivers a message the engine produced without a request, such as
    /// the statistics of a timed-out question.
    fn publish(&self, message: ServerMessage);
}

type Reply<T> = oneshot::Sender<Result<T, QuizError>>;

enum GameCommand {
    /// Load a quiz and ask its first question.
    Start {
        quiz: Arc<Quiz>,
        starter: String,
        reply: Reply<ServerMessage>,
    },
    /// Ask the next question, loading `quiz` first if nothing is loaded.
    Next {
        quiz: Arc<Quiz>,
        starter: String,
        reply: Reply<ServerMessage>,
    },
    SubmitAnswer {
        question_id: QuestionId,
        answers: Vec<AnswerId>,
        login: String,
        reply: Reply<QuestionStatsMessage>,
    },
    SubmitFreeText {
        question_id: QuestionId,
        texts: Vec<String>,
        login: String,
        reply: Reply<QuestionStatsMessage>,
    },
    Snapshot {
        reply: oneshot::Sender<GameSnapshot>,
    },
}

/// Handle to a running game actor.
///
/// Cheap to clone. The actor stops once every handle is dropped.
#[derive(Clone)]
pub struct QuizGameHandle {
    sender: mpsc::Sender<GameCommand>,
}

impl QuizGameHandle {
    /// Spawns a game actor for one session.
    pub fn spawn<L: SessionLink>(config: QuizConfig, link: L) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_size);
        let actor = GameActor {
            game: QuizGame::new(config),
            link,
            receiver: rx,
        };
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    /// Loads `quiz` (resetting any previous run) and asks its first
    /// question.
    pub async fn start(
        &self,
        quiz: Arc<Quiz>,
        starter: impl Into<String>,
    ) -> Result<ServerMessage, QuizError> {
        let starter = starter.into();
        self.request(|reply| GameCommand::Start {
            quiz,
            starter,
            reply,
        })
        .await
    }

    /// Asks the next question, or returns the quiz summary once every
    /// question has been asked.
    pub async fn next(
        &self,
        quiz: Arc<Quiz>,
        starter: impl Into<String>,
    ) -> Result<ServerMessage, QuizError> {
        let starter = starter.into();
        self.request(|reply| GameCommand::Next {
            quiz,
            starter,
            reply,
        })
        .await
    }

    pub async fn submit_answer(
        &self,
        question_id: QuestionId,
        answers: Vec<AnswerId>,
        login: impl Into<String>,
    ) -> Result<QuestionStatsMessage, QuizError> {
        let login = login.into();
        self.request(|reply| GameCommand::SubmitAnswer {
            question_id,
            answers,
            login,
            reply,
        })
        .await
    }

    pub async fn submit_free_text(
        &self,
        question_id: QuestionId,
        texts: Vec<String>,
        login: impl Into<String>,
    ) -> Result<QuestionStatsMessage, QuizError> {
        let login = login.into();
        self.request(|reply| GameCommand::SubmitFreeText {
            question_id,
            texts,
            login,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<GameSnapshot, QuizError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GameCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| QuizError::Unavailable)?;
        reply_rx.await.map_err(|_| QuizError::Unavailable)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> GameCommand,
    ) -> Result<T, QuizError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| QuizError::Unavailable)?;
        reply_rx.await.map_err(|_| QuizError::Unavailable)?
    }
}

struct GameActor<L> {
    game: QuizGame,
    link: L,
    receiver: mpsc::Receiver<GameCommand>,
}

impl<L: SessionLink> GameActor<L> {
    async fn run(mut self) {
        tracing::debug!("game actor started");

        loop {
            let deadline = self.game.deadline();
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    // A deadline that passed while the command was queued
                    // wins over the command.
                    self.fire_if_due();
                    self.handle(cmd);
                }
                () = sleep_or_pending(deadline) => self.fire_if_due(),
            }
        }

        tracing::debug!("game actor stopped");
    }

    fn handle(&mut self, cmd: GameCommand) {
        let now = Instant::now();
        match cmd {
            GameCommand::Start {
                quiz,
                starter,
                reply,
            } => {
                self.game.start(quiz, &starter, now);
                let _ = reply.send(self.game.advance(now));
            }
            GameCommand::Next {
                quiz,
                starter,
                reply,
            } => {
                if !self.game.is_loaded() {
                    self.game.start(quiz, &starter, now);
                }
                let _ = reply.send(self.game.advance(now));
            }
            GameCommand::SubmitAnswer {
                question_id,
                answers,
                login,
                reply,
            } => {
                let connected = self.link.connected_count();
                let result = self.game.submit_multiple_choice(
                    question_id,
                    &answers,
                    &login,
                    connected,
                );
                let _ = reply.send(result);
            }
            GameCommand::SubmitFreeText {
                question_id,
                texts,
                login,
                reply,
            } => {
                let connected = self.link.connected_count();
                let result =
                    self.game.submit_free_text(question_id, &texts, &login, connected);
                let _ = reply.send(result);
            }
            GameCommand::Snapshot { reply } => {
                let _ = reply.send(self.game.snapshot());
            }
        }
    }

    fn fire_if_due(&mut self) {
        let connected = self.link.connected_count();
        if let Some(stats) = self.game.expire(Instant::now(), connected) {
            tracing::debug!(
                actor = SYSTEM_ACTOR,
                question_id = stats.question_id,
                "publishing timed-out question"
            );
            self.link.publish(stats.into());
        }
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
