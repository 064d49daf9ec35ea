//! # LearnLoop
//!
//! Real-time multiplayer quiz backend.
//!
//! Clients connect over WebSocket with a session id and a credential,
//! join under a login, chat, and play timed quizzes together. Each session
//! has one authoritative game; the server drives question timeouts and
//! fans results out through a single connection hub.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use learnloop::prelude::*;
//!
//! # async fn run() -> Result<(), LearnLoopError> {
//! let config = ServerConfig::from_env()?;
//! let catalog = MemoryCatalog::load_dir("data").await?;
//! let auth = JwtAuthenticator::new(config.key_cache());
//!
//! let server = LearnLoopServerBuilder::new()
//!     .config(config)
//!     .catalog(catalog)
//!     .build(auth)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod connection;
mod dispatch;
mod error;
mod hub;
mod server;

pub use config::{BroadcastScope, ConnectionConfig, ServerConfig};
pub use connection::serve;
pub use dispatch::{CommandServices, ConnectionServices, execute};
pub use error::{DispatchError, LearnLoopError};
pub use hub::{HubHandle, HubStats, Outbound, Session};
pub use server::{LearnLoopServer, LearnLoopServerBuilder};

/// Everything needed to assemble and run a server.
pub mod prelude {
    pub use crate::{
        BroadcastScope, ConnectionConfig, DispatchError, HubHandle, LearnLoopError,
        LearnLoopServer, LearnLoopServerBuilder, ServerConfig,
    };
    pub use learnloop_protocol::{Codec, Command, JsonCodec, Quiz, ServerMessage};
    pub use learnloop_quiz::{MemoryCatalog, QuizCatalog, QuizConfig, QuizError};
    pub use learnloop_session::{
        Authenticator, Identity, JwtAuthenticator, KeyCacheConfig, Participant, SessionError,
        SessionId,
    };
}
