//! Cloud REST API client core.
//!
//! Every request flows through a composable middleware pipeline down to a
//! hyper transport: authentication (with a one-shot 401 refresh), bounded
//! retry with backoff, bounded redirect following, and transparent response
//! decompression. On top of the pipeline sit the batch envelope - many
//! logical requests in one wire call - and the chunked-upload response
//! handler.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nacre::prelude::*;
//! use nacre::auth::StaticTokenProvider;
//!
//! let client = HyperClient::builder()
//!     .with_default_pipeline(Arc::new(StaticTokenProvider::new("token")))
//!     .build();
//!
//! let api = ApiClient::new(client, "https://api.example.com/v1.0")?;
//! let response = api.execute(api.request(Method::Get, "/me")?.build()).await?;
//! ```

mod api_client;
pub mod auth;
pub mod batch;
mod client;
mod config;
mod connector;
pub mod middleware;
pub mod prelude;
mod upload;

// Re-export client types
pub use api_client::ApiClient;
pub use client::{BoxedService, HyperClient, HyperClientBuilder, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use upload::{ContentRange, UploadResponseHandler, UploadResult, UploadSession};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use nacre_core::{
    AuthOptions, Body, BodyStream, CompressionOptions, Error, ErrorDetail, ErrorResponse,
    GENERAL_EXCEPTION, HttpClient, HttpClientExt, MAX_REDIRECTS_CAP, MAX_RETRIES_CAP, Method,
    RedirectOptions, Request, RequestBuilder, RequestOptions, Response, ResponsePredicate, Result,
    RetryOptions, from_json, to_json,
};

// Re-export http types for status codes and headers
pub use nacre_core::{StatusCode, header};
