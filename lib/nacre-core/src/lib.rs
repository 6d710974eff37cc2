//! Core types and traits for the nacre cloud API client.
//!
//! This crate provides the foundational types used by nacre:
//! - [`Method`] - HTTP method enum
//! - [`Body`] - request body (buffered or one-shot stream)
//! - [`Request`] and [`RequestBuilder`] - HTTP request types
//! - [`Response`] - HTTP response type
//! - [`RequestOptions`] - per-request middleware overrides
//! - [`Error`] and [`Result`] - Error handling
//! - [`HttpClient`] - Core client trait for HTTP execution
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)
//! - [`header`] - HTTP header names (re-exported from `http` crate)

mod body;
mod client;
mod error;
mod method;
mod options;
pub mod prelude;
mod request;
mod response;

pub use body::{Body, BodyStream, from_json, to_json};
pub use client::{HttpClient, HttpClientExt};
pub use error::{Error, ErrorDetail, ErrorResponse, GENERAL_EXCEPTION, Result};
pub use method::Method;
pub use options::{
    AuthOptions, CompressionOptions, MAX_REDIRECTS_CAP, MAX_RETRIES_CAP, RedirectOptions,
    RequestOptions, ResponsePredicate, RetryOptions,
};
pub use request::{Request, RequestBuilder};
pub use response::Response;

// Re-export http crate types for status codes and headers
pub use http::{StatusCode, header};
