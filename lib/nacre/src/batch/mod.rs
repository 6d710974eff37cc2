//! Batch request composition and response demultiplexing.
//!
//! A batch folds up to twenty logical requests into one wire-level call.
//! Each sub-request is a [`BatchRequestStep`] with a caller-chosen id and an
//! optional `dependsOn` set naming steps that must complete first; the
//! service runs dependent steps sequentially and is free to run independent
//! ones concurrently. The aggregate reply carries one entry per id, which
//! [`BatchResponseContent`] splits back into individually addressable
//! responses.
//!
//! # Example
//!
//! ```ignore
//! use nacre::batch::{BatchRequestContent, BatchRequestStep};
//! use nacre::{Method, Request};
//!
//! let mut batch = BatchRequestContent::new();
//! let me = Request::builder(Method::Get, "https://api.example.com/v1.0/me".parse()?).build();
//! batch.add_step(BatchRequestStep::new("1", me));
//!
//! let payload = batch.serialize()?;
//! // POST payload to the service's $batch endpoint, then:
//! // let responses = BatchResponseContent::new(response);
//! // let first = responses.response_by_id("1");
//! ```

mod request;
mod response;

pub use request::{BatchRequestContent, BatchRequestStep, MAX_BATCH_STEPS};
pub use response::BatchResponseContent;
