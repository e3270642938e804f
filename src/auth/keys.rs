//! Signing-key cache backed by a JWKS endpoint.
//!
//! # Responsibilities
//! - Fetch the published key set through a `KeySource`
//! - Hold the current `kid → key` map behind an atomic pointer swap
//! - Resolve unknown `kid`s with one coordinated on-demand refresh
//!
//! # Data Flow
//! ```text
//! resolve(kid)
//!     → read refresh generation, look up kid in current set
//!     → hit: return key
//!     → miss: take refresh lock
//!         → generation moved on? someone refreshed while we waited: skip fetch
//!         → else fetch (bounded by timeout), swap set, bump generation
//!     → look up kid again
//! ```
//!
//! # Design Decisions
//! - Readers never lock: `ArcSwap::load` returns the whole current set
//! - A failed fetch keeps the previous set and still bumps the generation,
//!   so callers queued behind it do not repeat the failing fetch
//! - Only RSA signature keys are taken from the JWKS; HMAC tokens use the
//!   configured secret exclusively

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::resilience::with_deadline;

/// Error fetching or decoding a key set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key set request failed: {0}")]
    Fetch(String),

    #[error("key set endpoint returned status {0}")]
    Status(u16),

    #[error("key set body is invalid: {0}")]
    Decode(String),

    #[error("key set fetch timed out")]
    Timeout,
}

/// One entry of a JWKS document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kid: Option<String>,
    pub kty: String,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// A JWKS document: `{"keys": [...]}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JwksDocument {
    #[serde(default)]
    pub keys: Vec<JsonWebKey>,
}

/// Where key sets come from.
pub trait KeySource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<JwksDocument, KeyError>>;
}

/// Fetches a key set with `GET <url>`.
pub struct HttpKeySource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl KeySource for HttpKeySource {
    fn fetch(&self) -> BoxFuture<'_, Result<JwksDocument, KeyError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| KeyError::Fetch(e.to_string()))?;

            if !response.status().is_success() {
                return Err(KeyError::Status(response.status().as_u16()));
            }

            response
                .json::<JwksDocument>()
                .await
                .map_err(|e| KeyError::Decode(e.to_string()))
        })
    }
}

/// Immutable `kid → key` map plus the time it was fetched.
#[derive(Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<SystemTime>,
}

impl fmt::Debug for SigningKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeySet")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

impl SigningKeySet {
    /// Build a set from a JWKS document, skipping unusable entries.
    pub fn from_document(doc: &JwksDocument) -> Self {
        let mut keys = HashMap::new();

        for jwk in &doc.keys {
            let Some(kid) = jwk.kid.as_deref() else {
                continue;
            };
            if !jwk.kty.eq_ignore_ascii_case("RSA") {
                continue;
            }
            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            if jwk
                .alg
                .as_deref()
                .is_some_and(|alg| !(alg.starts_with("RS") || alg.starts_with("PS")))
            {
                continue;
            }
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                continue;
            };

            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(kid.to_string(), key);
                }
                Err(err) => tracing::warn!(kid, error = %err, "Skipping malformed RSA key"),
            }
        }

        Self {
            keys,
            fetched_at: Some(SystemTime::now()),
        }
    }

    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fetched_at(&self) -> Option<SystemTime> {
        self.fetched_at
    }
}

/// Shared signing-key cache.
pub struct KeyCache {
    source: Option<Arc<dyn KeySource>>,
    keys: ArcSwap<SigningKeySet>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Completed refresh attempts, successful or not.
    generation: AtomicU64,
    fetch_timeout: Duration,
}

impl KeyCache {
    pub fn new(source: Option<Arc<dyn KeySource>>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            keys: ArcSwap::from_pointee(SigningKeySet::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            fetch_timeout,
        }
    }

    /// A cache with no key source; only HMAC tokens can validate.
    pub fn disabled() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// The current key set.
    pub fn current(&self) -> Arc<SigningKeySet> {
        self.keys.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Resolve a key, refreshing once on a miss.
    pub async fn resolve(&self, kid: &str) -> Option<DecodingKey> {
        let seen = self.generation();
        if let Some(key) = self.keys.load().get(kid) {
            return Some(key.clone());
        }
        if self.source.is_none() {
            return None;
        }

        tracing::debug!(kid, "Unknown key id, refreshing key set");
        if let Err(err) = self.refresh_after(seen).await {
            tracing::debug!(kid, error = %err, "On-demand key refresh failed");
        }

        self.keys.load().get(kid).cloned()
    }

    /// Refresh unconditionally (used by the background task).
    pub async fn refresh(&self) -> Result<usize, KeyError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_swap().await
    }

    /// Refresh unless another refresh completed after generation `seen`.
    async fn refresh_after(&self, seen: u64) -> Result<usize, KeyError> {
        let _guard = self.refresh_lock.lock().await;
        if self.generation() != seen {
            return Ok(self.keys.load().len());
        }
        self.fetch_and_swap().await
    }

    async fn fetch_and_swap(&self) -> Result<usize, KeyError> {
        let Some(source) = &self.source else {
            return Ok(0);
        };

        let result = match with_deadline(self.fetch_timeout, source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(KeyError::Timeout),
        };

        let outcome = match result {
            Ok(doc) => {
                let set = SigningKeySet::from_document(&doc);
                let count = set.len();
                self.keys.store(Arc::new(set));
                tracing::info!(keys = count, "Signing key set refreshed");
                metrics::record_jwks_refresh("success");
                Ok(count)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Signing key refresh failed, keeping previous set");
                metrics::record_jwks_refresh("error");
                Err(err)
            }
        };

        self.generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Public half of `tests/fixtures/rsa_private.pem`.
    pub(crate) const TEST_N: &str = "w_PrdEppd5B57ADh9pmJeZGkeZubXlmgPBDhNox2Ri_dgHlSMne7CIdU36jtQVjeNTvQhPrgPd9DmY3_8aILJoLqEBkxgaV4E1TZ1DTIUKn9vDb3yk0t_2kBhe_UrLY5CQ8xP8qZthP3ElnVKZ9ix0bzdCelQ_OVGL1-dEKhyb8Nxkby3cQ7Ty6_oahl4nDnIKWeAZ1jZ-UdZf4tsXF9-ZzjlvWMUYNcF4O96lZPeak6DW4CXFvrWqvmaqgsS3aBifdD7L1dBqdx99e3E26zCYtzSwPFeLJgJKztbVhmxGwA48MDoCJnHWKOYgyaMbxfcRWI_MAGWnBJ2uABotv0LQ";
    pub(crate) const TEST_E: &str = "AQAB";

    pub(crate) fn rsa_jwk(kid: &str) -> JsonWebKey {
        JsonWebKey {
            kid: Some(kid.to_string()),
            kty: "RSA".into(),
            alg: Some("RS256".into()),
            key_use: Some("sig".into()),
            n: Some(TEST_N.into()),
            e: Some(TEST_E.into()),
        }
    }

    /// Counts fetches and serves a fixed document after a delay.
    pub(crate) struct CountingSource {
        pub(crate) calls: AtomicUsize,
        pub(crate) doc: JwksDocument,
        pub(crate) delay: Duration,
    }

    impl KeySource for CountingSource {
        fn fetch(&self) -> BoxFuture<'_, Result<JwksDocument, KeyError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                Ok(self.doc.clone())
            })
        }
    }

    struct FailingSource;

    impl KeySource for FailingSource {
        fn fetch(&self) -> BoxFuture<'_, Result<JwksDocument, KeyError>> {
            Box::pin(async { Err(KeyError::Status(500)) })
        }
    }

    #[test]
    fn test_from_document_filters_entries() {
        let doc = JwksDocument {
            keys: vec![
                rsa_jwk("good"),
                JsonWebKey { kid: None, ..rsa_jwk("x") },
                JsonWebKey { kty: "oct".into(), ..rsa_jwk("hmac") },
                JsonWebKey { key_use: Some("enc".into()), ..rsa_jwk("enc") },
                JsonWebKey { alg: Some("ES256".into()), ..rsa_jwk("ec") },
            ],
        };
        let set = SigningKeySet::from_document(&doc);
        assert_eq!(set.len(), 1);
        assert!(set.get("good").is_some());
        assert!(set.fetched_at().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            doc: JwksDocument { keys: vec![rsa_jwk("k1")] },
            delay: Duration::from_millis(100),
        });
        let cache = Arc::new(KeyCache::new(Some(source.clone()), Duration::from_secs(2)));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve("k1").await.is_some() })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_after_refresh_is_none() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            doc: JwksDocument { keys: vec![rsa_jwk("k1")] },
            delay: Duration::ZERO,
        });
        let cache = KeyCache::new(Some(source.clone()), Duration::from_secs(2));

        assert!(cache.resolve("nope").await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Known kid is served from the cache without another fetch.
        assert!(cache.resolve("k1").await.is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_bounded() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            doc: JwksDocument::default(),
            delay: Duration::from_secs(30),
        });
        let cache = KeyCache::new(Some(source), Duration::from_millis(50));

        let started = std::time::Instant::now();
        assert_eq!(cache.refresh().await, Err(KeyError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_set() {
        let good = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            doc: JwksDocument { keys: vec![rsa_jwk("k1")] },
            delay: Duration::ZERO,
        });
        let cache = KeyCache::new(Some(good), Duration::from_secs(1));
        cache.refresh().await.unwrap();

        let failing = KeyCache {
            source: Some(Arc::new(FailingSource)),
            ..cache
        };
        assert_eq!(failing.refresh().await, Err(KeyError::Status(500)));
        assert_eq!(failing.current().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_fetches() {
        let cache = KeyCache::disabled();
        assert!(!cache.has_source());
        assert!(cache.resolve("any").await.is_none());
        assert_eq!(cache.generation(), 0);
    }
}
