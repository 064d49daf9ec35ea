//! Participant identity for LearnLoop.
//!
//! This crate answers two questions about a connection:
//!
//! 1. **Who is it?** An [`Authenticator`] turns the credential presented
//!    at upgrade time into an [`Identity`]. [`JwtAuthenticator`] verifies
//!    signed tokens against the issuer's published key set, cached in a
//!    [`KeyCache`].
//! 2. **Where are they?** A [`Participant`] ties that identity to the
//!    [`SessionId`] the connection asked to join, plus the display login
//!    the client picks later.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)   ← authenticates each upgraded connection
//!     ↕
//! Session (this crate)
//!     ↕
//! Transport (below) ← supplies the raw token and session id
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod jwt;
mod keys;
mod participant;

pub use auth::Authenticator;
pub use error::SessionError;
pub use jwt::JwtAuthenticator;
pub use keys::{HttpKeyFetcher, KeyCache, KeyCacheConfig, KeyFetcher};
pub use participant::{Identity, Participant, SessionId};
