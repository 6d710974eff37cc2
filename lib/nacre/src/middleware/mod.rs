//! Tower middleware layers forming the request pipeline.
//!
//! Every outgoing request flows through an ordered chain of layers down to
//! the transport, and the response flows back up through the same chain.
//! Each layer wraps the next stage as a `(Request, next) -> Response`
//! interceptor: it may mutate the request before calling through, inspect
//! the response and call through again (bounded - every layer enforces its
//! own budget), or return early. Layers are applied in reverse order - the
//! last layer added is the first to process requests.
//!
//! # Available Layers
//!
//! - [`AuthenticationLayer`] - acquires a bearer token, replays once on 401
//! - [`RetryLayer`] - resends throttled/unavailable requests with backoff
//! - [`FollowRedirectLayer`] - follows `Location` targets on 3xx
//! - [`DecompressionLayer`] - inflates gzip/deflate response bodies
//! - [`LoggingLayer`] - tags requests with a `client-request-id` and logs
//!   each exchange with the service's `request-id` via `tracing`
//!
//! # Example: Using the Builder API
//!
//! ```ignore
//! use std::sync::Arc;
//! use nacre::HyperClient;
//! use nacre::auth::StaticTokenProvider;
//!
//! // The canonical pipeline in one call
//! let client = HyperClient::builder()
//!     .with_default_pipeline(Arc::new(StaticTokenProvider::new("token")))
//!     .build();
//!
//! // Power users: raw layer access
//! use nacre::middleware::RetryLayer;
//! let client = HyperClient::builder()
//!     .layer(RetryLayer::new().with_max_retries(3))
//!     .build();
//! ```

mod authentication;
mod decompression;
mod follow_redirect;
mod logging;
mod retry;

pub use authentication::{Authentication, AuthenticationLayer};
pub use decompression::{Decompression, DecompressionLayer};
pub use follow_redirect::{DEFAULT_MAX_REDIRECTS, FollowRedirect, FollowRedirectLayer};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub use retry::{DEFAULT_MAX_RETRIES, Retry, RetryLayer};

// Re-export tower types for convenience
pub use tower::{Layer, ServiceBuilder};
