//! Request logging and correlation-id tagging middleware.
//!
//! Tags each outgoing request with a `client-request-id` header (unless the
//! caller already set one) and logs the exchange together with the
//! service's `request-id` response header. A client log line can then be
//! matched against the service-side trace of the same call, which is the
//! first thing a support ticket asks for. Throttling responses are logged
//! with their `Retry-After` hint so backoff behavior is visible in traces.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::{Instrument, Level, debug, info, span, warn};

use crate::{Error, Request, Response, Result};

/// Layer that adds correlation-id tagging and request/response logging.
///
/// # Example
///
/// ```ignore
/// use nacre::middleware::LoggingLayer;
///
/// let layer = LoggingLayer::new();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    level: LogLevel,
}

/// Log level for the logging middleware.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogLevel {
    /// Log at debug level (request/response details).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

impl LoggingLayer {
    /// Create a new logging layer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging layer that logs at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            level: self.level,
        }
    }
}

/// Service that tags requests with a correlation id and logs outcomes.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    level: LogLevel,
}

/// A fresh UUID-shaped correlation id.
fn new_client_request_id() -> String {
    let hi = fastrand::u64(..);
    let lo = fastrand::u64(..);
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        hi >> 32,
        (hi >> 16) & 0xffff,
        hi & 0xffff,
        lo >> 48,
        lo & 0xffff_ffff_ffff
    )
}

impl<S> Service<Request> for Logging<S>
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
        let mut request = request;
        if !request.has_header("client-request-id") {
            request.insert_header("client-request-id", new_client_request_id());
        }
        let client_request_id = request
            .header("client-request-id")
            .unwrap_or_default()
            .to_owned();

        let method = request.method();
        let url = request.url().to_string();
        let level = self.level;

        let span = span!(
            Level::INFO,
            "http_request",
            %method,
            %url,
            client_request_id = %client_request_id
        );

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let start = Instant::now();

                if matches!(level, LogLevel::Debug) {
                    debug!(headers = ?request.headers(), "sending request");
                } else {
                    info!("sending request");
                }

                let result = inner.call(request).await;
                let elapsed = start.elapsed();

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        // The service-side correlation id for this call.
                        let request_id = response.header("request-id").unwrap_or_default();
                        if response.is_success() {
                            info!(status, request_id, elapsed = ?elapsed, "request completed");
                        } else if matches!(status, 429 | 503) {
                            let retry_after = response.header("Retry-After").unwrap_or_default();
                            warn!(
                                status,
                                request_id,
                                retry_after,
                                elapsed = ?elapsed,
                                "service throttled the request"
                            );
                        } else {
                            warn!(status, request_id, elapsed = ?elapsed, "request failed with HTTP error");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, elapsed = ?elapsed, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::Method;

    use super::*;

    #[test]
    fn logging_layer_default() {
        let layer = LoggingLayer::new();
        assert!(matches!(layer.level, LogLevel::Info));
    }

    #[test]
    fn logging_layer_debug() {
        let layer = LoggingLayer::debug();
        assert!(matches!(layer.level, LogLevel::Debug));
    }

    #[test]
    fn client_request_ids_are_uuid_shaped_and_distinct() {
        let first = new_client_request_id();
        let second = new_client_request_id();

        assert_eq!(first.len(), 36);
        for (i, c) in first.char_indices() {
            if matches!(i, 8 | 13 | 18 | 23) {
                assert_eq!(c, '-', "expected dash at {i} in {first}");
            } else {
                assert!(c.is_ascii_hexdigit(), "expected hex digit at {i} in {first}");
            }
        }
        assert_ne!(first, second);
    }

    fn header_probe(
        seen: Arc<std::sync::Mutex<Vec<Option<String>>>>,
    ) -> impl Service<
        Request,
        Response = Response<Bytes>,
        Error = Error,
        Future = impl Future<Output = Result<Response<Bytes>>> + Send,
    > + Clone
    + Send
    + 'static {
        tower::service_fn(move |req: Request| {
            seen.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(req.header("client-request-id").map(str::to_owned));
            async move { Ok(Response::new(200, HashMap::new(), Bytes::new())) }
        })
    }

    fn request(url: &str) -> Request {
        Request::builder(Method::Get, url::Url::parse(url).expect("url")).build()
    }

    #[tokio::test]
    async fn tags_requests_with_a_client_request_id() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut service = LoggingLayer::new().layer(header_probe(Arc::clone(&seen)));

        service
            .call(request("https://api.example.com/a"))
            .await
            .expect("response");
        service
            .call(request("https://api.example.com/b"))
            .await
            .expect("response");

        let seen = seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen.len(), 2);
        let first = seen.first().cloned().flatten().expect("tagged");
        let second = seen.get(1).cloned().flatten().expect("tagged");
        assert_eq!(first.len(), 36);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn caller_supplied_correlation_id_is_preserved() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut service = LoggingLayer::debug().layer(header_probe(Arc::clone(&seen)));

        let request = Request::builder(
            Method::Get,
            url::Url::parse("https://api.example.com/a").expect("url"),
        )
        .header("client-request-id", "caller-chose-this")
        .build();
        service.call(request).await.expect("response");

        let seen = seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(
            seen.first().and_then(Option::as_deref),
            Some("caller-chose-this")
        );
    }
}
