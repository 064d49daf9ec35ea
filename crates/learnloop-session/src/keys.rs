//! Verification key cache.
//!
//! Issuers publish their signing keys as a JWK set. Fetching it on every
//! connection would be slow and would hammer the issuer, so verified keys
//! are kept in a [`KeyCache`] for a fixed TTL.
//!
//! # Locking
//!
//! Lookups take the read lock. On a miss the caller queues on a gate for
//! that key-set URL, checks again (another task may have fetched the key
//! while it waited), and only then fetches. Concurrent first connections
//! from the same issuer trigger a single fetch. No cache lock is held
//! during a fetch, so a slow issuer only delays connections that name it,
//! and every fetch is bounded by [`KeyCacheConfig::fetch_timeout`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::SessionError;

/// Settings for key resolution.
#[derive(Debug, Clone)]
pub struct KeyCacheConfig {
    /// How long a fetched key stays valid before it is fetched again.
    ///
    /// Default: 12 hours.
    pub ttl: Duration,

    /// Fetch key sets over plain `http://` instead of `https://`, for
    /// issuers running on a developer machine.
    pub dev_mode: bool,

    /// Upper bound on one key-set fetch.
    ///
    /// Default: 10 seconds.
    pub fetch_timeout: Duration,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(12 * 60 * 60),
            dev_mode: false,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Retrieves a JWK set from a URL.
///
/// A trait so tests can serve key sets without a network.
pub trait KeyFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<JwkSet, SessionError>> + Send;
}

/// Fetches key sets over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpKeyFetcher {
    pub fn new() -> Self {
        Self::with_timeout(KeyCacheConfig::default().fetch_timeout)
    }

    /// Every request gives up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for HttpKeyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet, SessionError> {
        let failed = |e: reqwest::Error| SessionError::KeyFetch {
            url: url.to_owned(),
            reason: e.to_string(),
        };
        self.client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(failed)?
            .error_for_status()
            .map_err(failed)?
            .json::<JwkSet>()
            .await
            .map_err(failed)
    }
}

// ---------------------------------------------------------------------------
// KeyCache
// ---------------------------------------------------------------------------

struct CachedKey {
    key: DecodingKey,
    fetched_at: Instant,
}

/// Decoding keys by key-set URL and key id, each kept for one TTL.
pub struct KeyCache<F> {
    fetcher: F,
    ttl: Duration,
    fetch_timeout: Duration,
    entries: RwLock<HashMap<String, CachedKey>>,
    /// One gate per key-set URL; holders of a gate are the only ones
    /// fetching that URL.
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<F: KeyFetcher> KeyCache<F> {
    pub fn new(fetcher: F, config: &KeyCacheConfig) -> Self {
        Self {
            fetcher,
            ttl: config.ttl,
            fetch_timeout: config.fetch_timeout,
            entries: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the decoding key for `kid` published at `url`, fetching
    /// the key set if there is no fresh cached entry.
    pub async fn key(
        &self,
        url: &str,
        kid: Option<&str>,
    ) -> Result<DecodingKey, SessionError> {
        let name = match kid {
            Some(kid) => format!("{url}#{kid}"),
            None => url.to_owned(),
        };

        if let Some(key) = self.fresh(&name).await {
            return Ok(key);
        }

        let gate = {
            let mut gates = self.gates.lock().await;
            Arc::clone(gates.entry(url.to_owned()).or_default())
        };
        let _fetching = gate.lock().await;
        if let Some(key) = self.fresh(&name).await {
            return Ok(key);
        }

        tracing::info!(url, "fetching key set");
        let set = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| SessionError::KeyFetch {
                url: url.to_owned(),
                reason: format!("timed out after {:?}", self.fetch_timeout),
            })??;
        let jwk = select_key(&set, kid, url)?;
        let key = DecodingKey::from_jwk(jwk)?;

        self.entries.write().await.insert(
            name,
            CachedKey {
                key: key.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(key)
    }

    async fn fresh(&self, name: &str) -> Option<DecodingKey> {
        self.entries
            .read()
            .await
            .get(name)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.key.clone())
    }
}

/// Picks the key with a matching id, falling back to the first key.
fn select_key<'a>(
    set: &'a JwkSet,
    kid: Option<&str>,
    url: &str,
) -> Result<&'a Jwk, SessionError> {
    if let Some(kid) = kid {
        if let Some(jwk) = set.find(kid) {
            return Ok(jwk);
        }
        tracing::warn!(kid, url, "no key with matching id, using first key");
    }
    set.keys
        .first()
        .ok_or_else(|| SessionError::NoKeys(url.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_set() -> JwkSet {
        serde_json::from_str(include_str!("../tests/fixtures/test_rsa_jwk.json"))
            .unwrap()
    }

    #[test]
    fn test_select_key_by_id() {
        let set = key_set();
        let jwk = select_key(&set, Some("test-key-1"), "u").unwrap();
        assert_eq!(jwk.common.key_id.as_deref(), Some("test-key-1"));
    }

    #[test]
    fn test_select_key_falls_back_to_first() {
        let set = key_set();
        let jwk = select_key(&set, Some("rotated-away"), "u").unwrap();
        assert_eq!(jwk.common.key_id.as_deref(), Some("test-key-1"));
        assert!(select_key(&set, None, "u").is_ok());
    }

    #[test]
    fn test_select_key_from_empty_set() {
        let set = JwkSet { keys: vec![] };
        let err = select_key(&set, None, "https://x/.well-known/jwks.json")
            .unwrap_err();
        assert!(matches!(err, SessionError::NoKeys(_)));
    }

    #[test]
    fn test_default_ttl_is_twelve_hours() {
        let config = KeyCacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(43_200));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert!(!config.dev_mode);
    }
}
