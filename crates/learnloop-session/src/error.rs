//! Error types for the session layer.

/// Errors that can occur while establishing who a connection belongs to.
///
/// Every variant ends the connection attempt that triggered it; none of
/// them affect other connections or the session being joined.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The credential was rejected for a reason not covered below.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The token's issuer is not a `did:web` identifier we can resolve.
    #[error("issuer format is not valid: {0}")]
    InvalidIssuer(String),

    /// Fetching the issuer's key set failed (network, status, or body).
    #[error("failed to fetch key set from {url}: {reason}")]
    KeyFetch { url: String, reason: String },

    /// The key set was fetched but holds no usable key.
    #[error("no usable key in key set from {0}")]
    NoKeys(String),

    /// The token did not parse, or its signature or claims did not verify.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}
