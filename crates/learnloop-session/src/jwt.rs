//! Signed-token verification against `did:web` issuers.
//!
//! A token names its issuer in `iss` as `did:web:<domain>[:<port>]`. The
//! issuer publishes its keys at `https://<domain>[:<port>]/.well-known/jwks.json`.
//! Verification is therefore two passes over the same token:
//!
//! 1. Read `iss` and the header's `kid` without checking the signature.
//! 2. Resolve the key from the issuer and verify for real.
//!
//! Nothing from pass 1 is trusted beyond choosing where to look for the key.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::keys::{HttpKeyFetcher, KeyCache, KeyCacheConfig, KeyFetcher};
use crate::{Authenticator, Identity, SessionError};

/// Accepted signing algorithms: the RSA family only.
const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    iss: String,
    #[serde(default)]
    sub: String,
    #[serde(default, rename = "instanceBaseName")]
    instance_base_name: String,
}

/// An [`Authenticator`] for RSA-signed tokens from `did:web` issuers.
pub struct JwtAuthenticator<F = HttpKeyFetcher> {
    keys: KeyCache<F>,
    dev_mode: bool,
}

impl JwtAuthenticator<HttpKeyFetcher> {
    /// Creates an authenticator that fetches key sets over HTTP(S).
    pub fn new(config: KeyCacheConfig) -> Self {
        let fetcher = HttpKeyFetcher::with_timeout(config.fetch_timeout);
        Self::with_fetcher(config, fetcher)
    }
}

impl<F: KeyFetcher> JwtAuthenticator<F> {
    pub fn with_fetcher(config: KeyCacheConfig, fetcher: F) -> Self {
        Self {
            keys: KeyCache::new(fetcher, &config),
            dev_mode: config.dev_mode,
        }
    }
}

impl<F: KeyFetcher> Authenticator for JwtAuthenticator<F> {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        let header = jsonwebtoken::decode_header(token)?;
        if !RSA_ALGORITHMS.contains(&header.alg) {
            return Err(SessionError::AuthFailed(format!(
                "unexpected signing method: {:?}",
                header.alg
            )));
        }

        let unverified = peek_claims(token, header.alg)?;
        let url = key_set_url(&unverified.iss, self.dev_mode)?;
        let key = self.keys.key(&url, header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        let claims = jsonwebtoken::decode::<Claims>(token, &key, &validation)?.claims;

        if claims.sub.is_empty() {
            return Err(SessionError::AuthFailed("token has no subject".into()));
        }
        let user_id = user_id_from_subject(&claims.sub).to_owned();
        tracing::debug!(%user_id, issuer = %claims.iss, "token verified");

        Ok(Identity {
            user_id,
            instance_name: claims.instance_base_name,
        })
    }
}

/// Decodes the claims without checking the signature or expiry.
fn peek_claims(token: &str, alg: Algorithm) -> Result<Claims, SessionError> {
    let mut validation = Validation::new(alg);
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;
    let data =
        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Maps `did:web:<domain>[:<port>]` to the issuer's key-set URL.
fn key_set_url(issuer: &str, dev_mode: bool) -> Result<String, SessionError> {
    let parts: Vec<&str> = issuer.split(':').collect();
    if parts.len() < 3 || parts[0] != "did" || parts[1] != "web" || parts[2].is_empty()
    {
        return Err(SessionError::InvalidIssuer(issuer.to_owned()));
    }

    let domain = parts[2];
    let port = parts.get(3).map(|p| format!(":{p}")).unwrap_or_default();
    let scheme = if dev_mode { "http" } else { "https" };
    Ok(format!("{scheme}://{domain}{port}/.well-known/jwks.json"))
}

/// Extracts `<ID>` from a subject like `did:web:host/did/<ID>`.
///
/// Non-DID subjects are already plain ids. A DID subject without the
/// `/did/<ID>` suffix is used whole.
fn user_id_from_subject(subject: &str) -> &str {
    if !subject.starts_with("did:") {
        return subject;
    }
    let parts: Vec<&str> = subject.split('/').collect();
    if parts.len() > 2 && parts[parts.len() - 2] == "did" {
        return parts[parts.len() - 1];
    }
    tracing::warn!(subject, "subject has no user id segment, using it whole");
    subject
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_set_url_from_issuer() {
        assert_eq!(
            key_set_url("did:web:learn.example.org", false).unwrap(),
            "https://learn.example.org/.well-known/jwks.json"
        );
        assert_eq!(
            key_set_url("did:web:localhost:8443", false).unwrap(),
            "https://localhost:8443/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_key_set_url_dev_mode_uses_http() {
        assert_eq!(
            key_set_url("did:web:localhost:3000", true).unwrap(),
            "http://localhost:3000/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_key_set_url_rejects_other_issuers() {
        for issuer in ["", "https://issuer", "did:key:abc", "did:web", "did:web:"] {
            let err = key_set_url(issuer, false).unwrap_err();
            assert!(matches!(err, SessionError::InvalidIssuer(_)), "{issuer}");
        }
    }

    #[test]
    fn test_user_id_from_did_subject() {
        assert_eq!(user_id_from_subject("did:web:host:443/did/u-77"), "u-77");
    }

    #[test]
    fn test_user_id_from_plain_subject() {
        assert_eq!(user_id_from_subject("u-77"), "u-77");
    }

    #[test]
    fn test_user_id_from_did_without_id_segment() {
        assert_eq!(user_id_from_subject("did:web:host/users/7"), "did:web:host/users/7");
    }
}
