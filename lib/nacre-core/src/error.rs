//! Error types for nacre.

use bytes::Bytes;
use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

/// Error code used for malformed or undecodable responses.
pub const GENERAL_EXCEPTION: &str = "generalException";

// ============================================================================
// Service Error Payload
// ============================================================================

/// Structured error detail returned by the service.
///
/// The wire shape nests further detail under `innerError`, forming a chain;
/// [`ErrorDetail::matches_code`] searches the whole chain so callers can match
/// an error code without knowing at which depth the service reported it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Machine-readable error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Nested error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<Box<ErrorDetail>>,
}

impl ErrorDetail {
    /// Creates a detail with the given code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: Some(message.into()),
            inner_error: None,
        }
    }

    /// Creates a `generalException`-coded detail, used for malformed or
    /// undecodable responses.
    #[must_use]
    pub fn general_exception(message: impl Into<String>) -> Self {
        Self::new(GENERAL_EXCEPTION, message)
    }

    /// Returns `true` if this detail or any nested `innerError` carries the
    /// given code (case-insensitive).
    #[must_use]
    pub fn matches_code(&self, code: &str) -> bool {
        if self
            .code
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(code))
        {
            return true;
        }
        self.inner_error
            .as_deref()
            .is_some_and(|inner| inner.matches_code(code))
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code.as_deref(), self.message.as_deref()) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(code), None) => f.write_str(code),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

/// Wire envelope wrapping an [`ErrorDetail`]: `{"error": {...}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The wrapped error detail.
    pub error: ErrorDetail,
}

// ============================================================================
// Error Type
// ============================================================================

/// Main error type for nacre operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Token acquisition failure.
    #[display("authentication failed: {_0}")]
    #[from(skip)]
    Authentication(#[error(not(source))] String),

    /// Structured error from a non-success response or a malformed payload.
    #[display("service error {status}: {error}")]
    #[from(skip)]
    Service {
        /// HTTP status code of the failing response.
        status: u16,
        /// Parsed (or synthesized) error detail.
        #[error(not(source))]
        error: ErrorDetail,
        /// Raw response body, preserved for diagnostics.
        #[error(not(source))]
        raw_body: Option<Bytes>,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "error.innerError.code").
        path: String,
        /// Error message.
        message: String,
    },

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a service error from a parsed detail.
    #[must_use]
    pub fn service(status: u16, error: ErrorDetail, raw_body: Option<Bytes>) -> Self {
        Self::Service {
            status,
            error,
            raw_body,
        }
    }

    /// Create a `generalException`-coded service error for a malformed
    /// response, preserving the offending body for diagnostics.
    #[must_use]
    pub fn general_exception(
        status: u16,
        message: impl Into<String>,
        raw_body: Option<Bytes>,
    ) -> Self {
        Self::Service {
            status,
            error: ErrorDetail::general_exception(message),
            raw_body,
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if this is an authentication error.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Returns the HTTP status code if this is a service error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the structured error detail if this is a service error.
    #[must_use]
    pub const fn error_detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Service { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns the preserved raw body if this is a service error carrying one.
    #[must_use]
    pub fn raw_body(&self) -> Option<&Bytes> {
        match self {
            Self::Service { raw_body, .. } => raw_body.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` if this is a service error whose detail chain carries
    /// the given code.
    #[must_use]
    pub fn matches_error_code(&self, code: &str) -> bool {
        self.error_detail().is_some_and(|e| e.matches_code(code))
    }
}

#[cfg(test)]
mod tests {
    use assert2::let_assert;

    use super::*;

    #[test]
    fn error_display() {
        let err = Error::authentication("token denied");
        assert_eq!(err.to_string(), "authentication failed: token denied");

        let err = Error::Timeout;
        assert_eq!(err.to_string(), "request timeout");

        let err = Error::service(
            404,
            ErrorDetail::new("itemNotFound", "The item was not found"),
            None,
        );
        assert_eq!(
            err.to_string(),
            "service error 404: itemNotFound: The item was not found"
        );
    }

    #[test]
    fn error_detail_matches_code_at_top_level() {
        let detail = ErrorDetail::new("accessDenied", "nope");
        assert!(detail.matches_code("accessDenied"));
        assert!(detail.matches_code("ACCESSDENIED"));
        assert!(!detail.matches_code("itemNotFound"));
    }

    #[test]
    fn error_detail_matches_code_in_inner_chain() {
        let detail = ErrorDetail {
            code: Some("badRequest".to_string()),
            message: None,
            inner_error: Some(Box::new(ErrorDetail {
                code: Some("invalidRange".to_string()),
                message: None,
                inner_error: Some(Box::new(ErrorDetail::new("fragmentOverlap", ""))),
            })),
        };

        assert!(detail.matches_code("badRequest"));
        assert!(detail.matches_code("invalidRange"));
        assert!(detail.matches_code("fragmentOverlap"));
        assert!(!detail.matches_code("accessDenied"));
    }

    #[test]
    fn error_response_envelope_deserializes() {
        let body = br#"{"error":{"code":"tooManyRequests","message":"slow down","innerError":{"code":"quotaExceeded"}}}"#;
        let envelope: ErrorResponse = serde_json::from_slice(body).expect("deserialize");

        assert!(envelope.error.matches_code("quotaExceeded"));
        assert_eq!(envelope.error.message.as_deref(), Some("slow down"));
    }

    #[test]
    fn general_exception_preserves_raw_body() {
        let raw = Bytes::from_static(b"<html>gateway error</html>");
        let err = Error::general_exception(502, "unable to deserialize content", Some(raw.clone()));

        let_assert!(Error::Service { status, error, raw_body } = &err);
        assert_eq!(*status, 502);
        assert!(error.matches_code(GENERAL_EXCEPTION));
        assert_eq!(raw_body.as_ref(), Some(&raw));
    }

    #[test]
    fn error_status_and_predicates() {
        let err = Error::service(503, ErrorDetail::general_exception("unavailable"), None);
        assert_eq!(err.status(), Some(503));
        assert!(err.matches_error_code("generalException"));

        assert!(Error::Timeout.is_timeout());
        assert!(Error::connection("refused").is_connection());
        assert!(Error::authentication("denied").is_authentication());
        assert_eq!(Error::Timeout.status(), None);
    }
}
