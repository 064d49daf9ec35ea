//! Command dispatch: runs one decoded inbound command.
//!
//! [`execute`] is the only path from a client message to the quiz engine.
//! It runs against the acting participant, the participant's session, and
//! a small service surface ([`CommandServices`]) that the connection
//! implements on top of the hub and the quiz catalog.

use std::sync::Arc;

use learnloop_protocol::{Command, Quiz, QuizAction, QuizId, Recipient, ServerMessage};
use learnloop_quiz::QuizCatalog;
use learnloop_session::Participant;
use learnloop_transport::ConnectionId;

use crate::{DispatchError, HubHandle, Session};

/// What a command may do besides talking to its session's game.
pub trait CommandServices {
    /// Sends to the acting connection only.
    fn reply(&self, message: ServerMessage) -> Result<(), DispatchError>;

    /// Sends to everyone in the broadcast scope.
    fn broadcast(&self, message: ServerMessage) -> Result<(), DispatchError>;

    /// Looks quiz content up by id.
    fn quiz(&self, id: QuizId) -> Option<Arc<Quiz>>;

    /// Tells the session that the actor has joined under `login`.
    fn announce_join(&self, login: &str) -> Result<(), DispatchError>;
}

/// [`CommandServices`] for one live connection.
pub struct ConnectionServices {
    conn_id: ConnectionId,
    session: Session,
    hub: HubHandle,
    catalog: Arc<dyn QuizCatalog>,
}

impl ConnectionServices {
    pub fn new(
        conn_id: ConnectionId,
        session: Session,
        hub: HubHandle,
        catalog: Arc<dyn QuizCatalog>,
    ) -> Self {
        Self {
            conn_id,
            session,
            hub,
            catalog,
        }
    }
}

impl CommandServices for ConnectionServices {
    fn reply(&self, message: ServerMessage) -> Result<(), DispatchError> {
        self.hub.send_to(self.conn_id, &message)
    }

    fn broadcast(&self, message: ServerMessage) -> Result<(), DispatchError> {
        self.hub.broadcast(self.session.id(), &message)
    }

    fn quiz(&self, id: QuizId) -> Option<Arc<Quiz>> {
        self.catalog.quiz(id)
    }

    fn announce_join(&self, login: &str) -> Result<(), DispatchError> {
        self.hub.joined(self.conn_id, login)
    }
}

/// Runs `command` on behalf of `participant`.
///
/// Join sets the participant's login. Every quiz command and chat needs
/// that login, so they fail with [`DispatchError::NotJoined`] before it
/// is set.
pub async fn execute(
    command: Command,
    participant: &mut Participant,
    session: &Session,
    services: &impl CommandServices,
) -> Result<(), DispatchError> {
    match command {
        Command::Join(msg) => {
            participant.login = msg.from.id;
            services.announce_join(&participant.login)
        }
        Command::Leave(_) => Ok(()),
        Command::Chat(mut msg) => {
            require_joined(participant)?;
            msg.from = Recipient::learner(participant.login.as_str());
            services.broadcast(msg.into())
        }
        Command::StartQuiz(ctl) => {
            require_joined(participant)?;
            let quiz = resolve(services, ctl.quiz_id)?;
            let message = session.game().start(quiz, participant.login.as_str()).await?;
            services.broadcast(message)
        }
        Command::NextQuestion(ctl) => {
            require_joined(participant)?;
            let quiz = resolve(services, ctl.quiz_id)?;
            let message = session.game().next(quiz, participant.login.as_str()).await?;
            services.broadcast(message)
        }
        Command::Answer(msg) => {
            require_joined(participant)?;
            let stats = session
                .game()
                .submit_answer(msg.question_id, msg.answers, participant.login.as_str())
                .await?;
            services.reply(stats.into())
        }
        Command::FreeTextAnswer(msg) => {
            require_joined(participant)?;
            let stats = session
                .game()
                .submit_free_text(msg.question_id, msg.answers, participant.login.as_str())
                .await?;
            services.reply(stats.into())
        }
        Command::ServerOnly(msg) => Err(DispatchError::ServerOnly(server_only_label(&msg))),
    }
}

fn require_joined(participant: &Participant) -> Result<(), DispatchError> {
    if participant.has_joined() {
        Ok(())
    } else {
        Err(DispatchError::NotJoined)
    }
}

fn resolve(
    services: &impl CommandServices,
    quiz_id: QuizId,
) -> Result<Arc<Quiz>, DispatchError> {
    services
        .quiz(quiz_id)
        .ok_or(DispatchError::UnknownQuiz(quiz_id))
}

fn server_only_label(msg: &ServerMessage) -> &'static str {
    match msg.action() {
        Some(QuizAction::QuestionStarted) => "question-started",
        Some(QuizAction::QuestionStats) => "question-stats",
        Some(QuizAction::QuestionEnded) => "question-end",
        Some(QuizAction::QuizStats) => "quiz-stats",
        _ => "message",
    }
}
