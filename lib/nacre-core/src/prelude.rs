//! Prelude module for convenient imports.
//!
//! ```ignore
//! use nacre_core::prelude::*;
//! ```

pub use crate::{
    Body, Error, HttpClient, HttpClientExt, Method, Request, RequestBuilder, RequestOptions,
    Response, Result, StatusCode, from_json, header, to_json,
};
