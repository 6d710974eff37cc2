//! Retry middleware for transient service failures.
//!
//! Resends requests that drew a throttling or unavailability status (429,
//! 503 by default), waiting between attempts. The wait honors the server's
//! `Retry-After` hint when it is sane, and otherwise uses exponential
//! backoff with jitter. Only replayable requests are ever resent; when the
//! budget runs out the last response is returned as received, never an
//! error.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::debug;

use crate::{Error, MAX_RETRIES_CAP, Request, Response, Result};

/// Default retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// First backoff step; later steps double.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on a computed backoff delay.
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(30);

/// `Retry-After` values beyond this are ignored in favor of backoff.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(180);

/// Layer that retries throttled and unavailable requests.
///
/// # Example
///
/// ```ignore
/// use nacre::middleware::RetryLayer;
///
/// let layer = RetryLayer::new().with_max_retries(3);
/// ```
#[derive(Debug, Clone)]
pub struct RetryLayer {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryLayer {
    /// Create a retry layer with the default budget.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Sets the retry budget, clamped to [`MAX_RETRIES_CAP`].
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.min(MAX_RETRIES_CAP);
        self
    }

    /// Sets the first backoff step (doubles on every further attempt).
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            max_retries: self.max_retries,
            base_delay: self.base_delay,
        }
    }
}

/// Service that retries throttled and unavailable requests.
#[derive(Debug, Clone)]
pub struct Retry<S> {
    inner: S,
    max_retries: u32,
    base_delay: Duration,
}

/// Default retryable-status predicate.
fn default_should_retry(response: &Response<Bytes>) -> bool {
    matches!(response.status(), 429 | 503)
}

/// Delta-seconds `Retry-After` value, when present and parsable.
///
/// The HTTP-date form of the header is rare on throttling responses and is
/// treated as absent.
fn retry_after(response: &Response<Bytes>) -> Option<Duration> {
    response
        .header("Retry-After")?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Exponential backoff with jitter: half the doubled base plus a random
/// share of the other half, capped.
fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    let doubled = base_delay.saturating_mul(2_u32.saturating_pow(attempt));
    let capped = doubled.min(MAX_BACKOFF_DELAY);
    let half_ms = u64::try_from((capped / 2).as_millis()).unwrap_or(u64::MAX);
    let jitter = Duration::from_millis(fastrand::u64(0..=half_ms.max(1)));
    (capped / 2 + jitter).min(MAX_BACKOFF_DELAY)
}

fn compute_delay(response: &Response<Bytes>, base_delay: Duration, attempt: u32) -> Duration {
    if let Some(hinted) = retry_after(response) {
        if hinted <= MAX_RETRY_AFTER {
            return hinted;
        }
    }
    backoff_delay(base_delay, attempt)
}

impl<S> Service<Request> for Retry<S>
where
    S: Service<Request, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let base_delay = self.base_delay;
        let default_max = self.max_retries;

        Box::pin(async move {
            let options = request.options().retry().cloned();
            let max_retries = options
                .as_ref()
                .and_then(crate::RetryOptions::max_retries)
                .unwrap_or(default_max)
                .min(MAX_RETRIES_CAP);
            let predicate = options.as_ref().and_then(|o| o.should_retry().cloned());

            let mut attempt = 0_u32;
            let mut current = request;

            loop {
                let replay = current.try_clone();
                let response = inner.call(current).await?;

                let retryable = match &predicate {
                    Some(custom) => custom(&response),
                    None => default_should_retry(&response),
                };
                if !retryable || attempt >= max_retries {
                    return Ok(response);
                }
                // Unbuffered bodies are gone after the first send; the
                // response goes back as received.
                let Some(next) = replay else {
                    return Ok(response);
                };

                let delay = compute_delay(&response, base_delay, attempt);
                attempt += 1;
                debug!(
                    status = response.status(),
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                current = next;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{Body, Method, RetryOptions};

    use super::*;

    #[test]
    fn default_predicate_matches_throttle_statuses() {
        for status in [429, 503] {
            let response = Response::new(status, HashMap::new(), Bytes::new());
            assert!(default_should_retry(&response), "status {status}");
        }
        for status in [200, 302, 400, 404, 500, 502] {
            let response = Response::new(status, HashMap::new(), Bytes::new());
            assert!(!default_should_retry(&response), "status {status}");
        }
    }

    #[test]
    fn retry_after_header_parsed_as_seconds() {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), "7".to_string());
        let response = Response::new(429, headers, Bytes::new());
        assert_eq!(retry_after(&response), Some(Duration::from_secs(7)));

        let response = Response::new(429, HashMap::new(), Bytes::new());
        assert_eq!(retry_after(&response), None);

        let mut headers = HashMap::new();
        headers.insert(
            "Retry-After".to_string(),
            "Fri, 07 Aug 2026 07:28:00 GMT".to_string(),
        );
        let response = Response::new(429, headers, Bytes::new());
        assert_eq!(retry_after(&response), None);
    }

    #[test]
    fn oversized_retry_after_falls_back_to_backoff() {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), "86400".to_string());
        let response = Response::new(503, headers, Bytes::new());

        let delay = compute_delay(&response, Duration::from_millis(100), 0);
        assert!(delay <= MAX_BACKOFF_DELAY);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        for attempt in 0..12 {
            let delay = backoff_delay(base, attempt);
            assert!(delay <= MAX_BACKOFF_DELAY, "attempt {attempt}: {delay:?}");
        }
        // A late attempt saturates at the cap rather than overflowing.
        assert!(backoff_delay(base, u32::MAX) <= MAX_BACKOFF_DELAY);
    }

    #[test]
    fn layer_clamps_budget() {
        let layer = RetryLayer::new().with_max_retries(1000);
        assert_eq!(layer.max_retries, MAX_RETRIES_CAP);
    }

    /// Terminal service replying from a fixed status sequence (the last
    /// status repeats), counting calls.
    fn status_sequence(
        statuses: Vec<u16>,
        calls: Arc<AtomicUsize>,
    ) -> impl Service<
        Request,
        Response = Response<Bytes>,
        Error = Error,
        Future = impl Future<Output = Result<Response<Bytes>>> + Send,
    > + Clone
    + Send
    + 'static {
        tower::service_fn(move |_req: Request| {
            let i = calls.fetch_add(1, Ordering::SeqCst);
            let status = statuses
                .get(i)
                .or_else(|| statuses.last())
                .copied()
                .unwrap_or(200);
            async move { Ok(Response::new(status, HashMap::new(), Bytes::new())) }
        })
    }

    fn get_request() -> Request {
        Request::builder(
            Method::Get,
            url::Url::parse("https://api.example.com/items").expect("url"),
        )
        .build()
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = status_sequence(vec![503, 503, 200], Arc::clone(&calls));
        let mut service = RetryLayer::new()
            .with_base_delay(Duration::from_millis(1))
            .layer(inner);

        let response = service.call(get_request()).await.expect("response");
        assert_eq!(response.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_returns_last_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = status_sequence(vec![503], Arc::clone(&calls));
        let mut service = RetryLayer::new()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(1))
            .layer(inner);

        let response = service.call(get_request()).await.expect("response");
        assert_eq!(response.status(), 503);
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn per_request_budget_overrides_layer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = status_sequence(vec![429], Arc::clone(&calls));
        let mut service = RetryLayer::new()
            .with_base_delay(Duration::from_millis(1))
            .layer(inner);

        let request = Request::builder(
            Method::Get,
            url::Url::parse("https://api.example.com/items").expect("url"),
        )
        .retry_options(RetryOptions::new().with_max_retries(0))
        .build();

        let response = service.call(request).await.expect("response");
        assert_eq!(response.status(), 429);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_replaces_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = status_sequence(vec![502, 200], Arc::clone(&calls));
        let mut service = RetryLayer::new()
            .with_base_delay(Duration::from_millis(1))
            .layer(inner);

        let request = Request::builder(
            Method::Get,
            url::Url::parse("https://api.example.com/items").expect("url"),
        )
        .retry_options(
            RetryOptions::new().with_should_retry(|response| response.status() == 502),
        )
        .build();

        let response = service.call(request).await.expect("response");
        assert_eq!(response.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn streamed_body_is_never_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = status_sequence(vec![503], Arc::clone(&calls));
        let mut service = RetryLayer::new()
            .with_base_delay(Duration::from_millis(1))
            .layer(inner);

        let chunks = futures_util::stream::iter(vec![Ok(Bytes::from_static(b"chunk"))]);
        let request = Request::builder(
            Method::Post,
            url::Url::parse("https://api.example.com/items").expect("url"),
        )
        .body(Body::stream(chunks))
        .build();

        let response = service.call(request).await.expect("response");
        assert_eq!(response.status(), 503);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
