//! Timed quiz engine for LearnLoop.
//!
//! Each session owns one quiz game. The game runs as an isolated Tokio
//! task (actor model): submissions from any number of connections and the
//! question timer are all serialized through its command channel.
//!
//! # Key types
//!
//! - [`QuizGame`]: the state machine itself, synchronous and clock-free
//! - [`QuizGameHandle`]: send commands to a running game actor
//! - [`SessionLink`]: what a game needs from its session (live participant
//!   count, a way to publish timeout results)
//! - [`QuizCatalog`] / [`MemoryCatalog`]: read-only quiz content
//! - [`QuizConfig`]: armed and advertised question timeouts

mod actor;
mod catalog;
mod config;
mod error;
mod game;

pub use actor::{QuizGameHandle, SYSTEM_ACTOR, SessionLink};
pub use catalog::{MemoryCatalog, QuizCatalog};
pub use config::QuizConfig;
pub use error::QuizError;
pub use game::{GameSnapshot, QuestionTimer, QuizGame};
