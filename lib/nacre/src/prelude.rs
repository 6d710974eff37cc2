//! Prelude module for convenient imports.
//!
//! ```ignore
//! use nacre::prelude::*;
//! ```

pub use crate::auth::{AccessToken, CachingTokenProvider, StaticTokenProvider, TokenProvider};
pub use crate::batch::{BatchRequestContent, BatchRequestStep, BatchResponseContent};
pub use crate::{
    ApiClient, Body, ClientConfig, Error, HttpClient, HttpClientExt, HyperClient, Method, Request,
    RequestBuilder, RequestOptions, Response, Result, StatusCode, UploadResponseHandler,
    UploadResult, from_json, header, to_json,
};
pub use serde::{Deserialize, Serialize};
