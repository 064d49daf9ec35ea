//! Connection registry and broadcaster.
//!
//! The hub is a single Tokio task that owns three maps: every connection,
//! each session's connection list, and each session's [`Session`]. All
//! membership changes and every fan-out arrive as events on one channel
//! and are applied one at a time, so no map needs a lock.
//!
//! ```text
//! connection tasks ─┐                      ┌─→ outbound queue (conn-1)
//! game actors ──────┼─→ HubEvent channel ─→│─→ outbound queue (conn-2)
//!                   │     (one task)       └─→ outbound queue (conn-n)
//! ```
//!
//! Outbound queues are bounded. The hub never waits on one: a connection
//! whose queue is full is treated as dead and removed on the spot.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use learnloop_protocol::{Codec, JsonCodec, PresenceMessage, ServerMessage};
use learnloop_quiz::{QuizConfig, QuizGameHandle, SessionLink};
use learnloop_session::SessionId;
use learnloop_transport::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::{BroadcastScope, DispatchError};

/// One encoded frame. Encoded once, shared by every recipient.
pub type Outbound = Arc<str>;

/// A quiz session as seen by its connections.
///
/// Cheap to clone. Created by the hub the first time a connection names
/// the session, and kept for the life of the process.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    game: QuizGameHandle,
    connected: Arc<AtomicUsize>,
}

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The session's quiz game.
    pub fn game(&self) -> &QuizGameHandle {
        &self.game
    }

    /// Connections currently registered to the session.
    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Connection and session totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    pub sessions: usize,
}

enum HubEvent {
    Register {
        conn_id: ConnectionId,
        session_id: SessionId,
        queue: mpsc::Sender<Outbound>,
        reply: oneshot::Sender<Session>,
    },
    Unregister {
        conn_id: ConnectionId,
    },
    Joined {
        conn_id: ConnectionId,
        login: String,
    },
    Broadcast {
        origin: SessionId,
        frame: Outbound,
    },
    SendTo {
        conn_id: ConnectionId,
        frame: Outbound,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    Members {
        session_id: SessionId,
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
}

/// Handle to the running hub.
///
/// Cheap to clone. The hub stops once every handle is dropped.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::UnboundedSender<HubEvent>,
    codec: JsonCodec,
}

impl HubHandle {
    /// Spawns the hub task.
    ///
    /// `quiz` configures every session's game; `scope` decides who a
    /// broadcast reaches.
    pub fn spawn(quiz: QuizConfig, scope: BroadcastScope) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Hub {
            quiz,
            scope,
            codec: JsonCodec,
            connections: HashMap::new(),
            session_connections: HashMap::new(),
            sessions: HashMap::new(),
            receiver: rx,
            weak: tx.downgrade(),
        };
        tokio::spawn(hub.run());
        Self {
            sender: tx,
            codec: JsonCodec,
        }
    }

    /// Adds a connection to `session_id`, creating the session if this is
    /// its first connection. `queue` is the connection's outbound queue;
    /// the hub drops it on unregister, which closes the queue.
    pub async fn register(
        &self,
        conn_id: ConnectionId,
        session_id: SessionId,
        queue: mpsc::Sender<Outbound>,
    ) -> Result<Session, DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubEvent::Register {
            conn_id,
            session_id,
            queue,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| DispatchError::HubUnavailable)
    }

    /// Removes a connection. Does nothing if it is already gone.
    pub fn unregister(&self, conn_id: ConnectionId) {
        let _ = self.send(HubEvent::Unregister { conn_id });
    }

    /// Records the connection's login and announces every participant of
    /// its session.
    pub fn joined(
        &self,
        conn_id: ConnectionId,
        login: impl Into<String>,
    ) -> Result<(), DispatchError> {
        self.send(HubEvent::Joined {
            conn_id,
            login: login.into(),
        })
    }

    /// Sends `message` to everyone in the broadcast scope of `origin`.
    pub fn broadcast(
        &self,
        origin: &SessionId,
        message: &ServerMessage,
    ) -> Result<(), DispatchError> {
        let frame = self.encode(message)?;
        self.send(HubEvent::Broadcast {
            origin: origin.clone(),
            frame,
        })
    }

    /// Sends `message` to one connection.
    pub fn send_to(
        &self,
        conn_id: ConnectionId,
        message: &ServerMessage,
    ) -> Result<(), DispatchError> {
        let frame = self.encode(message)?;
        self.send(HubEvent::SendTo { conn_id, frame })
    }

    pub async fn stats(&self) -> Result<HubStats, DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubEvent::Stats { reply: reply_tx })?;
        reply_rx.await.map_err(|_| DispatchError::HubUnavailable)
    }

    /// The connections registered to `session_id`, in join order.
    pub async fn session_members(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ConnectionId>, DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubEvent::Members {
            session_id: session_id.clone(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| DispatchError::HubUnavailable)
    }

    fn encode(&self, message: &ServerMessage) -> Result<Outbound, DispatchError> {
        Ok(Arc::from(self.codec.encode(message)?))
    }

    fn send(&self, event: HubEvent) -> Result<(), DispatchError> {
        self.sender
            .send(event)
            .map_err(|_| DispatchError::HubUnavailable)
    }
}

// ---------------------------------------------------------------------------
// Hub task
// ---------------------------------------------------------------------------

struct Member {
    session_id: SessionId,
    login: String,
    queue: mpsc::Sender<Outbound>,
}

struct Hub {
    quiz: QuizConfig,
    scope: BroadcastScope,
    codec: JsonCodec,
    connections: HashMap<ConnectionId, Member>,
    session_connections: HashMap<SessionId, Vec<ConnectionId>>,
    sessions: HashMap<SessionId, Session>,
    receiver: mpsc::UnboundedReceiver<HubEvent>,
    /// Given to game actors so they can publish without keeping the hub
    /// alive.
    weak: mpsc::WeakUnboundedSender<HubEvent>,
}

impl Hub {
    async fn run(mut self) {
        tracing::info!(scope = ?self.scope, "hub running");

        while let Some(event) = self.receiver.recv().await {
            self.handle(event);
        }

        tracing::info!("hub stopped");
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register {
                conn_id,
                session_id,
                queue,
                reply,
            } => {
                let session = self.session(&session_id);
                self.connections.insert(
                    conn_id,
                    Member {
                        session_id: session_id.clone(),
                        login: String::new(),
                        queue,
                    },
                );
                let members = self
                    .session_connections
                    .entry(session_id.clone())
                    .or_default();
                members.push(conn_id);
                session.connected.store(members.len(), Ordering::SeqCst);
                tracing::info!(
                    %conn_id,
                    %session_id,
                    members = members.len(),
                    "connection registered"
                );
                let _ = reply.send(session);
            }
            HubEvent::Unregister { conn_id } => {
                self.remove(conn_id);
            }
            HubEvent::Joined { conn_id, login } => self.handle_joined(conn_id, login),
            HubEvent::Broadcast { origin, frame } => {
                let targets = self.targets(&origin);
                self.deliver(targets, &frame);
            }
            HubEvent::SendTo { conn_id, frame } => self.deliver(vec![conn_id], &frame),
            HubEvent::Stats { reply } => {
                let _ = reply.send(HubStats {
                    connections: self.connections.len(),
                    sessions: self.sessions.len(),
                });
            }
            HubEvent::Members { session_id, reply } => {
                let members = self
                    .session_connections
                    .get(&session_id)
                    .cloned()
                    .unwrap_or_default();
                let _ = reply.send(members);
            }
        }
    }

    /// The session for `session_id`, created with a fresh game on first
    /// use.
    fn session(&mut self, session_id: &SessionId) -> Session {
        if let Some(session) = self.sessions.get(session_id) {
            return session.clone();
        }

        let connected = Arc::new(AtomicUsize::new(0));
        let link = HubLink {
            session_id: session_id.clone(),
            connected: Arc::clone(&connected),
            hub: self.weak.clone(),
            codec: self.codec,
        };
        let session = Session {
            id: session_id.clone(),
            game: QuizGameHandle::spawn(self.quiz.clone(), link),
            connected,
        };
        self.sessions.insert(session_id.clone(), session.clone());
        tracing::info!(%session_id, "session created");
        session
    }

    fn handle_joined(&mut self, conn_id: ConnectionId, login: String) {
        let Some(member) = self.connections.get_mut(&conn_id) else {
            return;
        };
        member.login = login;
        let session_id = member.session_id.clone();
        tracing::debug!(%conn_id, %session_id, login = %member.login, "participant joined");

        let logins: Vec<String> = self
            .session_connections
            .get(&session_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(id))
                    .map(|m| m.login.clone())
                    .collect()
            })
            .unwrap_or_default();

        for login in logins {
            let notice = PresenceMessage::connected(&login, session_id.as_str());
            match self.codec.encode(&notice) {
                Ok(text) => {
                    let targets = self.targets(&session_id);
                    self.deliver(targets, &Arc::from(text));
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode presence notice"),
            }
        }
    }

    fn targets(&self, origin: &SessionId) -> Vec<ConnectionId> {
        match self.scope {
            BroadcastScope::Hub => self.connections.keys().copied().collect(),
            BroadcastScope::Session => self
                .session_connections
                .get(origin)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Offers `frame` to each target's queue without waiting. Targets
    /// that cannot take it are removed.
    fn deliver(&mut self, targets: Vec<ConnectionId>, frame: &Outbound) {
        let mut failed = Vec::new();
        for conn_id in targets {
            let Some(member) = self.connections.get(&conn_id) else {
                continue;
            };
            match member.queue.try_send(Arc::clone(frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%conn_id, "outbound queue full, dropping slow consumer");
                    failed.push(conn_id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(%conn_id, "outbound queue closed");
                    failed.push(conn_id);
                }
            }
        }
        for conn_id in failed {
            self.remove(conn_id);
        }
    }

    /// Drops the connection and its queue. Returns `false` if it was not
    /// registered.
    fn remove(&mut self, conn_id: ConnectionId) -> bool {
        let Some(member) = self.connections.remove(&conn_id) else {
            return false;
        };
        let remaining = match self.session_connections.get_mut(&member.session_id) {
            Some(ids) => {
                ids.retain(|id| *id != conn_id);
                ids.len()
            }
            None => 0,
        };
        if let Some(session) = self.sessions.get(&member.session_id) {
            session.connected.store(remaining, Ordering::SeqCst);
        }
        tracing::info!(
            %conn_id,
            session_id = %member.session_id,
            remaining,
            "connection unregistered"
        );
        true
    }
}

/// The hub side of a game's [`SessionLink`].
struct HubLink {
    session_id: SessionId,
    connected: Arc<AtomicUsize>,
    hub: mpsc::WeakUnboundedSender<HubEvent>,
    codec: JsonCodec,
}

impl SessionLink for HubLink {
    fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, message: ServerMessage) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        match self.codec.encode(&message) {
            Ok(text) => {
                let _ = hub.send(HubEvent::Broadcast {
                    origin: self.session_id.clone(),
                    frame: Arc::from(text),
                });
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "failed to encode game message");
            }
        }
    }
}
