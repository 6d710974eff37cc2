//! Bearer token authentication middleware.
//!
//! Acquires a token from the configured [`TokenProvider`] and adds an
//! `Authorization: Bearer <token>` header to every outgoing request. A 401
//! response triggers exactly one token refresh and replay, and only when
//! the request body is replayable; a second 401 goes back to the caller
//! untouched. Concurrent 401s for the same scope set converge on a single
//! refreshed token instead of each issuing an identity call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::debug;

use crate::auth::{TokenProvider, TokenRequest};
use crate::{Error, Request, Response, Result};

/// Layer that adds bearer token authentication to requests.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use nacre::auth::StaticTokenProvider;
/// use nacre::middleware::AuthenticationLayer;
///
/// let layer = AuthenticationLayer::new(Arc::new(StaticTokenProvider::new("my-token")));
/// ```
#[derive(Clone)]
pub struct AuthenticationLayer {
    provider: Option<Arc<dyn TokenProvider>>,
    default_scopes: Arc<[String]>,
}

impl AuthenticationLayer {
    /// Create a layer backed by the given token provider.
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider: Some(provider),
            default_scopes: Arc::from(Vec::new()),
        }
    }

    /// Create a layer that authenticates nothing.
    ///
    /// Requests pass through without an `Authorization` header and 401
    /// responses are never intercepted. Historically a missing provider was
    /// an error; it is now tolerated so unauthenticated endpoints work
    /// through the same pipeline.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            provider: None,
            default_scopes: Arc::from(Vec::new()),
        }
    }

    /// Sets the default scopes used when a request carries no
    /// [`crate::AuthOptions`].
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

impl std::fmt::Debug for AuthenticationLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationLayer")
            .field("provider", &self.provider.is_some())
            .field("default_scopes", &self.default_scopes)
            .finish()
    }
}

impl<S> Layer<S> for AuthenticationLayer {
    type Service = Authentication<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Authentication {
            inner,
            provider: self.provider.clone(),
            default_scopes: Arc::clone(&self.default_scopes),
        }
    }
}

/// Service that adds bearer token authentication to requests.
#[derive(Clone)]
pub struct Authentication<S> {
    inner: S,
    provider: Option<Arc<dyn TokenProvider>>,
    default_scopes: Arc<[String]>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Authentication<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authentication")
            .field("inner", &self.inner)
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

impl<S> Service<Request> for Authentication<S>
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
        let provider = self.provider.clone();
        let default_scopes = Arc::clone(&self.default_scopes);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(provider) = provider else {
                return inner.call(request).await;
            };

            let auth = request.options().auth().cloned().unwrap_or_default();
            let scopes: Vec<String> = if auth.scopes().is_empty() {
                default_scopes.to_vec()
            } else {
                auth.scopes().to_vec()
            };

            let mut token_request = TokenRequest::new(scopes.clone());
            token_request.force_refresh = auth.force_refresh();
            token_request.claims = auth.claims().map(str::to_owned);
            let token = provider.token(token_request).await?;

            let mut request = request;
            request.insert_header("Authorization", format!("Bearer {}", token.value()));

            // The replay copy exists only for buffered bodies; a one-shot
            // stream has been consumed by the first send and cannot go again.
            let replay = request.try_clone();

            let response = inner.call(request).await?;
            if response.status() != 401 {
                return Ok(response);
            }
            let Some(mut retry) = replay else {
                return Ok(response);
            };

            debug!("401 received, refreshing token and replaying once");
            let rejected = token.value().to_owned();
            let mut refresh = TokenRequest::new(scopes);
            refresh.claims = auth.claims().map(str::to_owned);

            // A parallel call working through the same 401 storm may
            // already have replaced the shared cached token; only force a
            // new acquisition when the cache still hands back the token
            // the service just rejected.
            let mut token = provider.token(refresh.clone()).await?;
            if token.value() == rejected {
                refresh.force_refresh = true;
                token = provider.token(refresh).await?;
            }

            retry.insert_header("Authorization", format!("Bearer {}", token.value()));
            inner.call(retry).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::auth::{AccessToken, StaticTokenProvider, TokenFuture};
    use crate::{AuthOptions, Body, Method};

    use super::*;

    struct SequenceProvider {
        calls: Arc<AtomicU32>,
    }

    impl TokenProvider for SequenceProvider {
        fn token(&self, _request: TokenRequest) -> TokenFuture<'_> {
            let calls = Arc::clone(&self.calls);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(AccessToken::new(format!("token-{n}")))
            })
        }
    }

    fn request(url: &str) -> Request {
        Request::builder(Method::Get, url::Url::parse(url).expect("url")).build()
    }

    /// Terminal service returning 401 until it sees the given token, then 200.
    fn unauthorized_until(
        accepted: &'static str,
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
            let header = req.header("Authorization").map(str::to_owned);
            seen.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(header.clone());
            async move {
                let status = if header.as_deref() == Some(accepted) {
                    200
                } else {
                    401
                };
                Ok(Response::new(status, HashMap::new(), Bytes::new()))
            }
        })
    }

    #[tokio::test]
    async fn injects_bearer_header() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let inner = unauthorized_until("Bearer fixed", Arc::clone(&seen));
        let mut service =
            AuthenticationLayer::new(Arc::new(StaticTokenProvider::new("fixed"))).layer(inner);

        let response = service.call(request("https://api.example.com/me")).await;
        assert_eq!(response.expect("response").status(), 200);

        let seen = seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.first().and_then(Option::as_deref), Some("Bearer fixed"));
    }

    #[tokio::test]
    async fn refreshes_once_on_401() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        // token-1 is rejected, the refreshed token-2 is accepted.
        let inner = unauthorized_until("Bearer token-2", Arc::clone(&seen));
        let provider = Arc::new(SequenceProvider {
            calls: Arc::clone(&calls),
        });
        let mut service = AuthenticationLayer::new(provider).layer(inner);

        let response = service.call(request("https://api.example.com/me")).await;
        assert_eq!(response.expect("response").status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_401_is_returned_unmodified() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        // No token is ever accepted.
        let inner = unauthorized_until("Bearer never", Arc::clone(&seen));
        let provider = Arc::new(SequenceProvider {
            calls: Arc::clone(&calls),
        });
        let mut service = AuthenticationLayer::new(provider).layer(inner);

        let response = service.call(request("https://api.example.com/me")).await;
        assert_eq!(response.expect("response").status(), 401);

        // One initial acquisition, one refresh - then the 401 surfaces.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let seen = seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn streamed_body_is_not_replayed() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let inner = unauthorized_until("Bearer never", Arc::clone(&seen));
        let provider = Arc::new(SequenceProvider {
            calls: Arc::clone(&calls),
        });
        let mut service = AuthenticationLayer::new(provider).layer(inner);

        let chunks = futures_util::stream::iter(vec![Ok(Bytes::from_static(b"chunk"))]);
        let request = Request::builder(
            Method::Post,
            url::Url::parse("https://api.example.com/items").expect("url"),
        )
        .body(Body::stream(chunks))
        .build();

        let response = service.call(request).await;
        assert_eq!(response.expect("response").status(), 401);

        // The token was acquired once and the 401 was never replayed.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let seen = seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_401_storm_shares_one_refresh() {
        use std::time::Duration;

        use crate::auth::CachingTokenProvider;

        /// Sequence provider slow enough that a whole storm queues behind
        /// its first refresh.
        struct SlowSequenceProvider {
            calls: Arc<AtomicU32>,
        }

        impl TokenProvider for SlowSequenceProvider {
            fn token(&self, _request: TokenRequest) -> TokenFuture<'_> {
                let calls = Arc::clone(&self.calls);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(AccessToken::new(format!("token-{n}")))
                })
            }
        }

        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        // token-1 draws a 401 from every call; token-2 is accepted.
        let inner = unauthorized_until("Bearer token-2", Arc::clone(&seen));
        let provider = Arc::new(CachingTokenProvider::new(SlowSequenceProvider {
            calls: Arc::clone(&calls),
        }));
        let service = AuthenticationLayer::new(provider).layer(inner);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let mut service = service.clone();
                tokio::spawn(
                    async move { service.call(request("https://api.example.com/me")).await },
                )
            })
            .collect();

        for task in tasks {
            let response = task.await.expect("join").expect("response");
            assert_eq!(response.status(), 200);
        }

        // One initial acquisition plus one refresh serve the whole storm.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn anonymous_layer_sends_no_header() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let inner = unauthorized_until("Bearer anything", Arc::clone(&seen));
        let mut service = AuthenticationLayer::anonymous().layer(inner);

        let response = service.call(request("https://api.example.com/public")).await;
        // The 401 passes through without interception.
        assert_eq!(response.expect("response").status(), 401);

        let seen = seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.first().and_then(Option::as_deref), None);
    }

    #[tokio::test]
    async fn request_scopes_override_defaults() {
        #[derive(Clone)]
        struct ScopeProbe {
            scopes: Arc<std::sync::Mutex<Vec<Vec<String>>>>,
        }

        impl TokenProvider for ScopeProbe {
            fn token(&self, request: TokenRequest) -> TokenFuture<'_> {
                self.scopes
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(request.scopes);
                Box::pin(async move { Ok(AccessToken::new("probe")) })
            }
        }

        let scopes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let probe = ScopeProbe {
            scopes: Arc::clone(&scopes),
        };
        let inner = tower::service_fn(|_req: Request| async move {
            Ok::<_, Error>(Response::new(200, HashMap::new(), Bytes::new()))
        });
        let mut service = AuthenticationLayer::new(Arc::new(probe))
            .with_scopes(["default-scope"])
            .layer(inner);

        service
            .call(request("https://api.example.com/a"))
            .await
            .expect("response");

        let override_request = Request::builder(
            Method::Get,
            url::Url::parse("https://api.example.com/b").expect("url"),
        )
        .auth_options(AuthOptions::new(["special-scope"]))
        .build();
        service.call(override_request).await.expect("response");

        let scopes = scopes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(
            *scopes,
            vec![
                vec!["default-scope".to_string()],
                vec!["special-scope".to_string()]
            ]
        );
    }
}
