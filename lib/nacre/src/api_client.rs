//! Generic API client wrapper.
//!
//! [`ApiClient`] binds any [`HttpClient`] to a versioned base URL: paths
//! resolve against the base, and batches built from it relativize their
//! step URLs against the same base.

use bytes::Bytes;
use url::Url;

use crate::batch::BatchRequestContent;
use crate::{Error, HttpClient, Method, Request, RequestBuilder, Response, Result};

/// Generic API client wrapper.
///
/// Wraps any [`HttpClient`] with a base URL. This is useful for sharing a
/// single HTTP client (with its connection pool and middleware pipeline)
/// across several service roots or API versions.
///
/// # Example
///
/// ```ignore
/// use nacre::{ApiClient, HyperClient};
///
/// let http = HyperClient::builder().with_retry(3).build();
/// let v1 = ApiClient::new(http.clone(), "https://api.example.com/v1.0")?;
/// let beta = ApiClient::new(http, "https://api.example.com/beta")?;
/// ```
#[derive(Debug)]
pub struct ApiClient<C> {
    client: C,
    base_url: Url,
}

impl<C: Clone> Clone for ApiClient<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl<C> ApiClient<C> {
    /// Create a new API client with the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn new(client: C, base_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url.as_ref()).map_err(Error::InvalidUrl)?,
        })
    }

    /// Create a new API client with a pre-parsed URL.
    #[must_use]
    pub const fn with_url(client: C, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// The base URL all paths resolve against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Start building a request for a service-relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolved URL is invalid.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Request::builder(method, Url::parse(&url)?))
    }

    /// Start an empty batch whose step URLs relativize against this
    /// client's base.
    #[must_use]
    pub fn batch(&self) -> BatchRequestContent {
        BatchRequestContent::new().with_base_url(self.base_url.clone())
    }

    /// Get a reference to the inner HTTP client.
    #[must_use]
    pub const fn inner(&self) -> &C {
        &self.client
    }

    /// Consume the wrapper and return the inner HTTP client.
    pub fn into_inner(self) -> C {
        self.client
    }
}

impl<C> HttpClient for ApiClient<C>
where
    C: HttpClient,
{
    async fn execute(&self, request: Request) -> Result<Response<Bytes>> {
        self.client.execute(request).await
    }
}
