//! Per-request middleware options.
//!
//! A [`RequestOptions`] bag travels with each [`crate::Request`] and lets a
//! single call override a middleware's default policy. The bag is a closed
//! set of typed slots - one per middleware kind - so "at most one option of
//! each kind" holds by construction and a middleware reads its slot with a
//! plain field access instead of a runtime type lookup.

use std::sync::Arc;

use bytes::Bytes;

use crate::Response;

/// Predicate over a buffered response, used for per-request policy overrides.
pub type ResponsePredicate = Arc<dyn Fn(&Response<Bytes>) -> bool + Send + Sync>;

/// Hard cap on the per-request retry budget.
pub const MAX_RETRIES_CAP: u32 = 10;

/// Hard cap on the per-request redirect budget.
pub const MAX_REDIRECTS_CAP: usize = 20;

/// Options attached to a single outgoing request.
///
/// Absent slots mean "use the middleware default".
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    auth: Option<AuthOptions>,
    retry: Option<RetryOptions>,
    redirect: Option<RedirectOptions>,
    compression: Option<CompressionOptions>,
}

impl RequestOptions {
    /// Creates an empty option bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the authentication options.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthOptions) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the retry options.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the redirect options.
    #[must_use]
    pub fn with_redirect(mut self, redirect: RedirectOptions) -> Self {
        self.redirect = Some(redirect);
        self
    }

    /// Sets the compression options.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionOptions) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Authentication options, if set.
    #[must_use]
    pub const fn auth(&self) -> Option<&AuthOptions> {
        self.auth.as_ref()
    }

    /// Retry options, if set.
    #[must_use]
    pub const fn retry(&self) -> Option<&RetryOptions> {
        self.retry.as_ref()
    }

    /// Redirect options, if set.
    #[must_use]
    pub const fn redirect(&self) -> Option<&RedirectOptions> {
        self.redirect.as_ref()
    }

    /// Compression options, if set.
    #[must_use]
    pub const fn compression(&self) -> Option<&CompressionOptions> {
        self.compression.as_ref()
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Per-request authentication overrides.
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    scopes: Vec<String>,
    force_refresh: bool,
    claims: Option<String>,
}

impl AuthOptions {
    /// Creates auth options requesting the given scopes.
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

    /// Bypass the token cache for the initial acquisition.
    #[must_use]
    pub const fn with_force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Additional claims to request, as delivered by a claims challenge.
    #[must_use]
    pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
        self.claims = Some(claims.into());
        self
    }

    /// Requested scopes. Empty means "use the pipeline default scopes".
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Whether the initial token acquisition bypasses the cache.
    #[must_use]
    pub const fn force_refresh(&self) -> bool {
        self.force_refresh
    }

    /// Claims challenge payload, if any.
    #[must_use]
    pub fn claims(&self) -> Option<&str> {
        self.claims.as_deref()
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Per-request retry overrides.
#[derive(Clone, Default)]
pub struct RetryOptions {
    max_retries: Option<u32>,
    should_retry: Option<ResponsePredicate>,
}

impl RetryOptions {
    /// Creates empty retry options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget, clamped to [`MAX_RETRIES_CAP`].
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries.min(MAX_RETRIES_CAP));
        self
    }

    /// Replaces the default retryable-status predicate.
    #[must_use]
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response<Bytes>) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// The overridden retry budget, if set.
    #[must_use]
    pub const fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// The overridden retry predicate, if set.
    #[must_use]
    pub const fn should_retry(&self) -> Option<&ResponsePredicate> {
        self.should_retry.as_ref()
    }
}

impl std::fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("should_retry", &self.should_retry.is_some())
            .finish()
    }
}

// ============================================================================
// Redirect
// ============================================================================

/// Per-request redirect overrides.
#[derive(Clone, Default)]
pub struct RedirectOptions {
    max_redirects: Option<usize>,
    should_redirect: Option<ResponsePredicate>,
}

impl RedirectOptions {
    /// Creates empty redirect options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the redirect budget, clamped to [`MAX_REDIRECTS_CAP`].
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = Some(max_redirects.min(MAX_REDIRECTS_CAP));
        self
    }

    /// Replaces the default follow-this-redirect predicate.
    #[must_use]
    pub fn with_should_redirect<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response<Bytes>) -> bool + Send + Sync + 'static,
    {
        self.should_redirect = Some(Arc::new(predicate));
        self
    }

    /// The overridden redirect budget, if set.
    #[must_use]
    pub const fn max_redirects(&self) -> Option<usize> {
        self.max_redirects
    }

    /// The overridden redirect predicate, if set.
    #[must_use]
    pub const fn should_redirect(&self) -> Option<&ResponsePredicate> {
        self.should_redirect.as_ref()
    }
}

impl std::fmt::Debug for RedirectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectOptions")
            .field("max_redirects", &self.max_redirects)
            .field("should_redirect", &self.should_redirect.is_some())
            .finish()
    }
}

// ============================================================================
// Compression
// ============================================================================

/// Per-request decompression overrides.
#[derive(Clone, Default)]
pub struct CompressionOptions {
    should_decompress: Option<ResponsePredicate>,
}

impl CompressionOptions {
    /// Creates empty compression options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the default decompress-this-response predicate.
    #[must_use]
    pub fn with_should_decompress<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response<Bytes>) -> bool + Send + Sync + 'static,
    {
        self.should_decompress = Some(Arc::new(predicate));
        self
    }

    /// The overridden decompression predicate, if set.
    #[must_use]
    pub const fn should_decompress(&self) -> Option<&ResponsePredicate> {
        self.should_decompress.as_ref()
    }
}

impl std::fmt::Debug for CompressionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionOptions")
            .field("should_decompress", &self.should_decompress.is_some())
            .finish()
    }
}
