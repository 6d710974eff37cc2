//! Token acquisition.
//!
//! [`TokenProvider`] is the consumed auth primitive: given scopes, produce a
//! bearer token. [`CachingTokenProvider`] wraps any provider with a
//! per-scope-set cache that also collapses concurrent acquisitions into a
//! single in-flight request - under a 401 storm, many requests refresh at
//! once and must not each hit the identity service.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::Result;

/// Default leeway subtracted from a token's expiry when deciding staleness.
const DEFAULT_EXPIRY_LEEWAY: Duration = Duration::from_secs(60);

/// A bearer token with an optional expiry.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    /// Creates a token that never expires.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Creates a token expiring at the given instant.
    #[must_use]
    pub fn with_expiry(value: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(expires_at),
        }
    }

    /// The raw token value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The expiry instant, if known.
    #[must_use]
    pub const fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns `true` if the token expires within `leeway` from now.
    #[must_use]
    pub fn is_expired(&self, leeway: Duration) -> bool {
        self.expires_at
            .is_some_and(|at| Instant::now() + leeway >= at)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The token value stays out of logs.
        f.debug_struct("AccessToken")
            .field("value_len", &self.value.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Parameters for one token acquisition.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Bypass any cache and fetch a fresh token.
    pub force_refresh: bool,
    /// Claims challenge payload from a token revocation event, if any.
    pub claims: Option<String>,
}

impl TokenRequest {
    /// Creates a request for the given scopes.
    #[must_use]
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            force_refresh: false,
            claims: None,
        }
    }
}

/// Boxed future returned by [`TokenProvider::token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>>;

/// Source of bearer tokens.
///
/// # Errors
///
/// Implementations fail with [`crate::Error::Authentication`] when the
/// identity service denies the request.
pub trait TokenProvider: Send + Sync + 'static {
    /// Acquire a token for the given request.
    fn token(&self, request: TokenRequest) -> TokenFuture<'_>;
}

/// Provider returning a fixed, never-expiring token.
///
/// Useful for tests and for services addressed with a pre-issued key.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Arc<str>,
}

impl StaticTokenProvider {
    /// Creates a provider for the given token value.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::from(token.into()),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self, _request: TokenRequest) -> TokenFuture<'_> {
        let token = AccessToken::new(self.token.to_string());
        Box::pin(async move { Ok(token) })
    }
}

struct CacheEntry {
    token: AccessToken,
    acquired_at: Instant,
}

type CacheSlot = Arc<AsyncMutex<Option<CacheEntry>>>;

/// Caching wrapper around a [`TokenProvider`].
///
/// Tokens are cached per normalized scope set. Each scope set has its own
/// async mutex held across the inner acquisition, so concurrent callers for
/// the same scopes await the one in-flight fetch instead of issuing
/// duplicates. A forced refresh that was already waiting when another
/// caller's refresh landed reuses that fresh token instead of issuing its
/// own identity call, so a 401 storm collapses onto a single refresh.
pub struct CachingTokenProvider<P> {
    inner: P,
    expiry_leeway: Duration,
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl<P> CachingTokenProvider<P> {
    /// Wraps the given provider with a token cache.
    #[must_use]
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            expiry_leeway: DEFAULT_EXPIRY_LEEWAY,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the expiry leeway: a cached token this close to expiry is
    /// treated as stale.
    #[must_use]
    pub fn with_expiry_leeway(mut self, leeway: Duration) -> Self {
        self.expiry_leeway = leeway;
        self
    }

    fn slot(&self, key: &str) -> CacheSlot {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(slots.entry(key.to_string()).or_default())
    }
}

impl<P> std::fmt::Debug for CachingTokenProvider<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingTokenProvider")
            .field("expiry_leeway", &self.expiry_leeway)
            .finish_non_exhaustive()
    }
}

fn scope_key(scopes: &[String]) -> String {
    let mut normalized: Vec<&str> = scopes.iter().map(String::as_str).collect();
    normalized.sort_unstable();
    normalized.join(" ")
}

impl<P: TokenProvider> TokenProvider for CachingTokenProvider<P> {
    fn token(&self, request: TokenRequest) -> TokenFuture<'_> {
        Box::pin(async move {
            let arrived = Instant::now();
            let key = scope_key(&request.scopes);
            let slot = self.slot(&key);

            // Holding the slot lock across the inner call is the
            // single-flight guarantee for this scope set.
            let mut cached = slot.lock().await;

            // A claims challenge always invalidates the cached token.
            let bypass = request.force_refresh || request.claims.is_some();
            if let Some(entry) = cached.as_ref() {
                if !entry.token.is_expired(self.expiry_leeway) {
                    if !bypass {
                        return Ok(entry.token.clone());
                    }
                    // A forced refresh that queued behind another caller's
                    // refresh finds a token newer than its own arrival;
                    // that refresh already evicted the token this caller
                    // is trying to replace.
                    if request.claims.is_none() && entry.acquired_at > arrived {
                        return Ok(entry.token.clone());
                    }
                }
            }

            debug!(scopes = %key, force_refresh = request.force_refresh, "acquiring token");
            let token = self.inner.token(request).await?;
            *cached = Some(CacheEntry {
                token: token.clone(),
                acquired_at: Instant::now(),
            });
            Ok(token)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountingProvider {
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(calls: Arc<AtomicU32>) -> Self {
            Self {
                calls,
                delay: Duration::ZERO,
            }
        }

        fn with_delay(calls: Arc<AtomicU32>, delay: Duration) -> Self {
            Self { calls, delay }
        }
    }

    impl TokenProvider for CountingProvider {
        fn token(&self, _request: TokenRequest) -> TokenFuture<'_> {
            let calls = Arc::clone(&self.calls);
            let delay = self.delay;
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(AccessToken::new(format!("token-{n}")))
            })
        }
    }

    #[tokio::test]
    async fn static_provider_returns_fixed_token() {
        let provider = StaticTokenProvider::new("fixed");
        let token = provider
            .token(TokenRequest::new(["scope"]))
            .await
            .expect("token");
        assert_eq!(token.value(), "fixed");
        assert_eq!(token.expires_at(), None);
        assert!(!token.is_expired(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn cache_serves_repeat_requests() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CachingTokenProvider::new(CountingProvider::new(Arc::clone(&calls)));

        let first = provider
            .token(TokenRequest::new(["a"]))
            .await
            .expect("token");
        let second = provider
            .token(TokenRequest::new(["a"]))
            .await
            .expect("token");

        assert_eq!(first.value(), second.value());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CachingTokenProvider::new(CountingProvider::new(Arc::clone(&calls)));

        let first = provider
            .token(TokenRequest::new(["a"]))
            .await
            .expect("token");
        let mut refresh = TokenRequest::new(["a"]);
        refresh.force_refresh = true;
        let second = provider.token(refresh).await.expect("token");

        assert_ne!(first.value(), second.value());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn claims_challenge_bypasses_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CachingTokenProvider::new(CountingProvider::new(Arc::clone(&calls)));

        provider
            .token(TokenRequest::new(["a"]))
            .await
            .expect("token");
        let mut challenged = TokenRequest::new(["a"]);
        challenged.claims = Some("{\"access_token\":{}}".to_string());
        provider.token(challenged).await.expect("token");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scope_sets_are_cached_independently() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CachingTokenProvider::new(CountingProvider::new(Arc::clone(&calls)));

        provider
            .token(TokenRequest::new(["a"]))
            .await
            .expect("token");
        provider
            .token(TokenRequest::new(["b"]))
            .await
            .expect("token");
        // Scope order does not matter for the cache key.
        provider
            .token(TokenRequest::new(["b", "a"]))
            .await
            .expect("token");
        provider
            .token(TokenRequest::new(["a", "b"]))
            .await
            .expect("token");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrent_acquisitions_single_flight() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = Arc::new(CachingTokenProvider::new(CountingProvider::with_delay(
            Arc::clone(&calls),
            Duration::from_millis(20),
        )));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.token(TokenRequest::new(["shared"])).await })
            })
            .collect();

        for task in tasks {
            let token = task.await.expect("join").expect("token");
            assert_eq!(token.value(), "token-1");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_storm_collapses_onto_one_fetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = Arc::new(CachingTokenProvider::new(CountingProvider::with_delay(
            Arc::clone(&calls),
            Duration::from_millis(20),
        )));

        // Prime the cache, then revoke it from four callers at once.
        provider
            .token(TokenRequest::new(["shared"]))
            .await
            .expect("token");

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    let mut refresh = TokenRequest::new(["shared"]);
                    refresh.force_refresh = true;
                    provider.token(refresh).await
                })
            })
            .collect();

        for task in tasks {
            let token = task.await.expect("join").expect("token");
            // Every storm participant ends up on the one refreshed token.
            assert_eq!(token.value(), "token-2");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_token_is_refetched() {
        let calls = Arc::new(AtomicU32::new(0));
        let inner = ExpiringProvider {
            calls: Arc::clone(&calls),
        };
        let provider = CachingTokenProvider::new(inner).with_expiry_leeway(Duration::ZERO);

        provider
            .token(TokenRequest::new(["a"]))
            .await
            .expect("token");
        provider
            .token(TokenRequest::new(["a"]))
            .await
            .expect("token");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct ExpiringProvider {
        calls: Arc<AtomicU32>,
    }

    impl TokenProvider for ExpiringProvider {
        fn token(&self, _request: TokenRequest) -> TokenFuture<'_> {
            let calls = Arc::clone(&self.calls);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                // Already expired on arrival.
                Ok(AccessToken::with_expiry("stale", Instant::now()))
            })
        }
    }

    #[test]
    fn access_token_debug_redacts_value() {
        let token = AccessToken::new("super-secret");
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
    }
}
