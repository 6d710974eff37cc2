//! Follow redirect middleware.
//!
//! Follows 3xx responses carrying a `Location` header, resolving relative
//! targets against the current URL. The original method is preserved on
//! every redirect code, including 301/302/303 - this matches the service's
//! documented client behavior and deliberately diverges from the browser
//! convention of demoting POST to GET. Exhausting the hop budget returns
//! the last redirect response unmodified; a redirect without a `Location`
//! header is a malformed response and fails hard.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::debug;
use url::Url;

use crate::{Error, MAX_REDIRECTS_CAP, Request, Response, Result};

/// Default maximum number of redirects to follow.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Layer that follows HTTP redirects.
///
/// # Example
///
/// ```ignore
/// use nacre::middleware::FollowRedirectLayer;
///
/// let layer = FollowRedirectLayer::new();
/// ```
#[derive(Debug, Clone)]
pub struct FollowRedirectLayer {
    max_redirects: usize,
}

impl Default for FollowRedirectLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl FollowRedirectLayer {
    /// Create a follow redirect layer with the default hop budget (5).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Create a follow redirect layer with a custom hop budget, clamped to
    /// [`MAX_REDIRECTS_CAP`].
    #[must_use]
    pub fn with_max_redirects(max_redirects: usize) -> Self {
        Self {
            max_redirects: max_redirects.min(MAX_REDIRECTS_CAP),
        }
    }
}

impl<S> Layer<S> for FollowRedirectLayer {
    type Service = FollowRedirect<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FollowRedirect {
            inner,
            max_redirects: self.max_redirects,
        }
    }
}

/// Service that follows HTTP redirects.
#[derive(Debug, Clone)]
pub struct FollowRedirect<S> {
    inner: S,
    max_redirects: usize,
}

/// Check if a status code is a redirect this middleware follows.
fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Resolve a redirect Location URL relative to the original request URL.
fn resolve_redirect_url(base_url: &Url, location: &str) -> Result<Url> {
    // Try parsing as absolute URL first
    if let Ok(url) = Url::parse(location) {
        return Ok(url);
    }

    // Parse as relative URL
    base_url.join(location).map_err(Error::InvalidUrl)
}

impl<S> Service<Request> for FollowRedirect<S>
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
        let default_max = self.max_redirects;

        Box::pin(async move {
            let options = request.options().redirect().cloned();
            let max_redirects = options
                .as_ref()
                .and_then(crate::RedirectOptions::max_redirects)
                .unwrap_or(default_max)
                .min(MAX_REDIRECTS_CAP);
            let predicate = options.as_ref().and_then(|o| o.should_redirect().cloned());

            let mut hops = 0_usize;
            let mut current = request;

            loop {
                let current_url = current.url().clone();
                let replay = current.try_clone();
                let response = inner.call(current).await?;

                if !is_redirect(response.status()) {
                    return Ok(response);
                }
                if let Some(follow) = predicate.as_ref() {
                    if !follow(&response) {
                        return Ok(response);
                    }
                }
                if hops >= max_redirects {
                    debug!(
                        status = response.status(),
                        hops, "redirect hop budget exhausted"
                    );
                    return Ok(response);
                }
                // A consumed stream cannot be resent towards the new target.
                let Some(mut next) = replay else {
                    return Ok(response);
                };

                let Some(location) = response.header("Location").map(str::to_owned) else {
                    let (status, _, body) = response.into_parts();
                    return Err(Error::general_exception(
                        status,
                        "redirect response missing Location header",
                        Some(body),
                    ));
                };

                let target = resolve_redirect_url(&current_url, &location)?;
                // Credentials never travel to a different host.
                if target.host_str() != current_url.host_str() {
                    next.remove_header("Authorization");
                }

                debug!(status = response.status(), location = %target, "following redirect");
                next.set_url(target);
                hops += 1;
                current = next;
            }
        })
    }
}
