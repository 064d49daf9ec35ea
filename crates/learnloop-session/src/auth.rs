//! Authentication hook for validating participant identity.
//!
//! The server calls an [`Authenticator`] once per upgraded connection with
//! the `token` from the upgrade request. A failure closes the connection
//! before it is registered anywhere.
//!
//! [`JwtAuthenticator`](crate::JwtAuthenticator) is the production
//! implementation. Tests and local setups can plug in anything else.

use crate::{Identity, SessionError};

/// Validates a client's credential and returns who they are.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the life of the server.
///
/// # Example
///
/// ```rust
/// use learnloop_session::{Authenticator, Identity, SessionError};
///
/// /// Treats the token itself as the user id. Development only.
/// struct TrustingAuthenticator;
///
/// impl Authenticator for TrustingAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         if token.is_empty() {
///             return Err(SessionError::AuthFailed("empty token".into()));
///         }
///         Ok(Identity {
///             user_id: token.to_owned(),
///             instance_name: "local".into(),
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Verifies `token` and returns the holder's identity.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}
