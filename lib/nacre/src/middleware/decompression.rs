//! Response decompression middleware.
//!
//! Advertises `Accept-Encoding` on requests and transparently inflates
//! responses encoded with gzip or deflate before downstream consumers see
//! them. A per-request [`crate::CompressionOptions`] predicate can keep a
//! response compressed.

use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::{Error, Request, Response, Result};

/// Layer that enables automatic response decompression.
///
/// # Example
///
/// ```ignore
/// use nacre::middleware::DecompressionLayer;
///
/// let layer = DecompressionLayer::new();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressionLayer {
    _private: (),
}

impl DecompressionLayer {
    /// Create a new decompression layer.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl<S> Layer<S> for DecompressionLayer {
    type Service = Decompression<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Decompression { inner }
    }
}

/// Service that automatically decompresses HTTP responses.
#[derive(Debug, Clone)]
pub struct Decompression<S> {
    inner: S,
}

/// Decompress bytes based on encoding.
fn decompress(encoding: &str, status: u16, body: Bytes) -> Result<Bytes> {
    let result = match encoding {
        "gzip" | "x-gzip" => {
            let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed).map_err(|e| {
                Error::general_exception(
                    status,
                    format!("gzip decompression failed: {e}"),
                    Some(body.clone()),
                )
            })?;
            Bytes::from(decompressed)
        }
        "deflate" => {
            let mut decoder = flate2::read::DeflateDecoder::new(body.as_ref());
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed).map_err(|e| {
                Error::general_exception(
                    status,
                    format!("deflate decompression failed: {e}"),
                    Some(body.clone()),
                )
            })?;
            Bytes::from(decompressed)
        }
        _ => {
            // Unknown encoding, return as-is
            body
        }
    };

    Ok(result)
}

impl<S> Service<Request> for Decompression<S>
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
        let mut request = request;
        if !request.has_header("Accept-Encoding") {
            request.insert_header("Accept-Encoding", "gzip, deflate");
        }
        let predicate = request
            .options()
            .compression()
            .and_then(|o| o.should_decompress().cloned());

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(request).await?;

            let encoding = response
                .header("Content-Encoding")
                .unwrap_or_default()
                .to_ascii_lowercase();
            if !matches!(encoding.as_str(), "gzip" | "x-gzip" | "deflate") {
                return Ok(response);
            }
            if let Some(wants) = predicate.as_ref() {
                if !wants(&response) {
                    return Ok(response);
                }
            }

            let (status, mut headers, body) = response.into_parts();
            let decompressed = decompress(&encoding, status, body)?;

            // The body no longer matches the wire framing headers.
            headers.retain(|key, _| !key.eq_ignore_ascii_case("content-encoding"));
            headers.retain(|key, _| !key.eq_ignore_ascii_case("content-length"));
            headers.insert("content-length".to_string(), decompressed.len().to_string());

            Ok(Response::new(status, headers, decompressed))
        })
    }
}
