//! HTTP request building.
//!
//! Use [`Request::builder`] to construct requests with headers, query
//! parameters, a [`Body`], and per-request [`RequestOptions`].
//!
//! # Example
//!
//! ```
//! use nacre_core::{Request, Method};
//!
//! let request = Request::builder(Method::Get, "https://api.example.com/me".parse().unwrap())
//!     .header("Accept", "application/json")
//!     .build();
//! ```

use std::collections::HashMap;

use crate::{Body, Method, RequestOptions};

/// An HTTP request with method, URL, headers, body, and middleware options.
///
/// Header names are matched case-insensitively by the accessors, matching the
/// wire semantics of HTTP field names.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: url::Url,
    headers: HashMap<String, String>,
    body: Body,
    options: RequestOptions,
}

impl Request {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub const fn url(&self) -> &url::Url {
        &self.url
    }

    /// Replaces the request URL (used when following a redirect).
    pub fn set_url(&mut self, url: url::Url) {
        self.url = url;
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Single header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` if a header with the given name is present
    /// (case-insensitive).
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Sets a header, replacing any existing value under a
    /// case-insensitive match of the name.
    pub fn insert_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
    }

    /// Removes a header by name (case-insensitive), returning its value.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let key = self
            .headers
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()?;
        self.headers.remove(&key)
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Per-request middleware options.
    #[must_use]
    pub const fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Clones the request if its body is replayable.
    ///
    /// A request carrying a one-shot stream yields `None`: resending it
    /// would replay an already-consumed body. Middlewares use this as the
    /// single gate for every resend decision.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
            options: self.options.clone(),
        })
    }

    /// Consume into (method, url, headers, body, options).
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        Method,
        url::Url,
        HashMap<String, String>,
        Body,
        RequestOptions,
    ) {
        (
            self.method,
            self.url,
            self.headers,
            self.body,
            self.options,
        )
    }

}

/// Builder for constructing [`Request`] instances.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: url::Url,
    headers: HashMap<String, String>,
    body: Body,
    options: RequestOptions,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HashMap::new(),
            body: Body::Empty,
            options: RequestOptions::default(),
        }
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets multiple headers.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(self, value: &T) -> crate::Result<Self> {
        let body = crate::to_json(value)?;
        Ok(self
            .header("Content-Type", "application/json")
            .body(body))
    }

    /// Replaces the whole option bag.
    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets per-request authentication options.
    #[must_use]
    pub fn auth_options(mut self, auth: crate::AuthOptions) -> Self {
        self.options = self.options.with_auth(auth);
        self
    }

    /// Sets per-request retry options.
    #[must_use]
    pub fn retry_options(mut self, retry: crate::RetryOptions) -> Self {
        self.options = self.options.with_retry(retry);
        self
    }

    /// Sets per-request redirect options.
    #[must_use]
    pub fn redirect_options(mut self, redirect: crate::RedirectOptions) -> Self {
        self.options = self.options.with_redirect(redirect);
        self
    }

    /// Sets per-request compression options.
    #[must_use]
    pub fn compression_options(mut self, compression: crate::CompressionOptions) -> Self {
        self.options = self.options.with_compression(compression);
        self
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            options: self.options,
        }
    }
}
