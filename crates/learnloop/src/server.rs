//! `LearnLoopServer` builder and accept loop.
//!
//! Ties the layers together: transport → session (credential check) →
//! hub → per-connection flows → quiz engine.

use std::sync::Arc;

use learnloop_quiz::{MemoryCatalog, QuizCatalog};
use learnloop_session::{Authenticator, Participant, SessionId};
use learnloop_transport::{Incoming, WebSocketTransport};

use crate::{HubHandle, LearnLoopError, ServerConfig, connection};

/// Close reason sent to connections whose credential does not verify.
const UNAUTHORIZED: &str = "Unauthorized";

/// State shared by every connection task.
struct ServerState<A: Authenticator> {
    auth: A,
    hub: HubHandle,
    catalog: Arc<dyn QuizCatalog>,
    config: ServerConfig,
}

/// Builder for configuring and starting a LearnLoop server.
///
/// # Example
///
/// ```rust,ignore
/// use learnloop::prelude::*;
///
/// let server = LearnLoopServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .catalog(catalog)
///     .build(JwtAuthenticator::new(KeyCacheConfig::default()))
///     .await?;
/// server.run().await
/// ```
pub struct LearnLoopServerBuilder {
    config: ServerConfig,
    catalog: Arc<dyn QuizCatalog>,
}

impl LearnLoopServerBuilder {
    /// Creates a builder with default settings and an empty catalog.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            catalog: Arc::new(MemoryCatalog::new()),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets where start and next look quiz content up.
    pub fn catalog(mut self, catalog: impl QuizCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Binds the listener and starts the hub.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<LearnLoopServer<A>, LearnLoopError> {
        let transport =
            WebSocketTransport::bind(&self.config.bind_addr, self.config.transport.clone())
                .await?;
        let hub = HubHandle::spawn(self.config.quiz.clone(), self.config.broadcast_scope);

        let state = Arc::new(ServerState {
            auth,
            hub,
            catalog: self.catalog,
            config: self.config,
        });

        Ok(LearnLoopServer { transport, state })
    }
}

impl Default for LearnLoopServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound LearnLoop server, produced by [`LearnLoopServerBuilder::build`].
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct LearnLoopServer<A: Authenticator> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A>>,
}

impl<A: Authenticator> LearnLoopServer<A> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The hub every connection registers with.
    pub fn hub(&self) -> &HubHandle {
        &self.state.hub
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Each accepted socket gets its own task for the upgrade, the
    /// credential check and both connection flows, so one slow client
    /// never holds up the others.
    pub async fn run(mut self) -> Result<(), LearnLoopError> {
        tracing::info!(addr = %self.state.config.bind_addr, "LearnLoop server running");

        loop {
            match self.transport.accept().await {
                Ok(incoming) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_incoming(incoming, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

async fn handle_incoming<A: Authenticator>(
    incoming: Incoming,
    state: Arc<ServerState<A>>,
) -> Result<(), LearnLoopError> {
    let peer = incoming.peer_addr();
    let conn = incoming.upgrade().await?;
    let conn_id = conn.id();

    let identity = match state.auth.authenticate(&conn.handshake().token).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::info!(%conn_id, %peer, error = %e, "credential rejected");
            conn.reject(UNAUTHORIZED).await?;
            return Ok(());
        }
    };

    let session_id = SessionId::new(conn.handshake().session_id.as_str());
    let participant = Participant::new(identity, session_id);
    tracing::info!(
        %conn_id,
        session_id = %participant.session_id,
        user_id = %participant.user_id,
        "connection authenticated"
    );

    connection::serve(
        conn,
        participant,
        state.hub.clone(),
        Arc::clone(&state.catalog),
        &state.config.connection,
    )
    .await
}
