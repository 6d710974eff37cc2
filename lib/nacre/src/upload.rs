//! Chunked upload response handling.
//!
//! A chunked upload PUTs byte ranges against a session URL until the
//! service answers with the created item instead of more expected ranges.
//! [`UploadResponseHandler`] turns each raw chunk response into an
//! [`UploadResult`]: the finished item, a session continuation, or an
//! error. [`ContentRange`] builds the `Content-Range` header for the
//! request side.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, ErrorDetail, ErrorResponse, Response, Result, from_json};

/// Server-side state of an ongoing chunked upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// URL chunk PUTs are addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    /// When the session expires, as reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date_time: Option<String>,
    /// Byte ranges the service still expects, as `start-end` or `start-`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_expected_ranges: Option<Vec<String>>,
}

impl UploadSession {
    /// First byte of the next expected range, if the service reported one.
    #[must_use]
    pub fn next_range_start(&self) -> Option<u64> {
        let ranges = self.next_expected_ranges.as_ref()?;
        let first = ranges.first()?;
        first
            .split('-')
            .next()
            .and_then(|start| start.parse().ok())
    }
}

/// A `Content-Range: bytes {start}-{end}/{total}` header for one chunk PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte of the chunk (inclusive).
    pub start: u64,
    /// Last byte of the chunk (inclusive).
    pub end: u64,
    /// Total size of the upload.
    pub total: u64,
}

impl ContentRange {
    /// Creates a range for bytes `start..=end` of `total`.
    #[must_use]
    pub const fn new(start: u64, end: u64, total: u64) -> Self {
        Self { start, end, total }
    }

    /// The `Content-Range` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }

    /// The chunk length, for the `Content-Length` header.
    #[must_use]
    pub const fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Outcome of one chunk response: the upload is either finished or ongoing,
/// never both.
#[derive(Debug)]
pub enum UploadResult<T> {
    /// The upload finished; the service returned the created or updated
    /// resource.
    Completed {
        /// The deserialized resource.
        item: T,
        /// The `Location` header of the creating response, if present.
        location: Option<String>,
    },
    /// The upload is ongoing; the service expects more ranges.
    InProgress(UploadSession),
}

impl<T> UploadResult<T> {
    /// Returns `true` once the upload has finished.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The finished item, when complete.
    #[must_use]
    pub const fn item_response(&self) -> Option<&T> {
        match self {
            Self::Completed { item, .. } => Some(item),
            Self::InProgress(_) => None,
        }
    }

    /// The session continuation, while ongoing.
    #[must_use]
    pub const fn upload_session(&self) -> Option<&UploadSession> {
        match self {
            Self::Completed { .. } => None,
            Self::InProgress(session) => Some(session),
        }
    }

    /// The `Location` header captured from a 201 response.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Completed { location, .. } => location.as_deref(),
            Self::InProgress(_) => None,
        }
    }
}

/// Interprets raw chunk-upload responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadResponseHandler {
    _private: (),
}

impl UploadResponseHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Interprets one chunk response.
    ///
    /// - 201 with an item body finishes the upload, capturing `Location`.
    /// - 200/202 with `nextExpectedRanges` continues the session.
    /// - 200/202 without expected ranges finishes the upload (the service
    ///   returned the final item in a plain 200).
    ///
    /// # Errors
    ///
    /// - An empty body fails with a `generalException`-coded service error.
    /// - A non-success status fails with the parsed service error (or a
    ///   `generalException` one when the body is unparsable), preserving
    ///   the raw body and status.
    /// - A success body that deserializes neither as a session nor as `T`
    ///   fails with a `generalException`-coded service error carrying the
    ///   raw body and the inner parse error.
    pub fn handle<T: serde::de::DeserializeOwned>(
        &self,
        response: Response<Bytes>,
    ) -> Result<UploadResult<T>> {
        let (status, headers, body) = response.into_parts();

        if body.is_empty() {
            return Err(Error::general_exception(
                status,
                "no response received for upload",
                None,
            ));
        }

        if !(200..300).contains(&status) {
            let error = serde_json::from_slice::<ErrorResponse>(&body).map_or_else(
                |_| ErrorDetail::general_exception("unable to deserialize content"),
                |envelope| envelope.error,
            );
            return Err(Error::service(status, error, Some(body)));
        }

        let location = header_value(&headers, "Location");

        if status == 201 {
            let item = parse_item(status, &body)?;
            return Ok(UploadResult::Completed { item, location });
        }

        if let Ok(session) = serde_json::from_slice::<UploadSession>(&body) {
            if session.next_expected_ranges.is_some() {
                return Ok(UploadResult::InProgress(session));
            }
        }

        let item = parse_item(status, &body)?;
        Ok(UploadResult::Completed { item, location })
    }
}

fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

fn parse_item<T: serde::de::DeserializeOwned>(status: u16, body: &Bytes) -> Result<T> {
    from_json(body).map_err(|e| {
        Error::general_exception(
            status,
            format!("unable to deserialize content: {e}"),
            Some(body.clone()),
        )
    })
}
