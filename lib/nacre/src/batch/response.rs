//! Batch response envelope decoding.

use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::Response;

/// Wire shape of the aggregate reply: `{"responses": [...]}`.
#[derive(Debug, Deserialize)]
struct BatchResponsePayload {
    #[serde(default)]
    responses: Vec<BatchResponseItem>,
}

#[derive(Debug, Deserialize)]
struct BatchResponseItem {
    id: String,
    status: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

/// The aggregate reply of a batch call, demultiplexed by step id.
///
/// The JSON body is parsed lazily on first access and exactly once. An
/// empty, absent, or malformed `responses` array yields an empty mapping
/// rather than an error - per-step failures are visible as per-step
/// statuses, not as a decoding failure of the envelope.
#[derive(Debug)]
pub struct BatchResponseContent {
    response: Response<Bytes>,
    parsed: OnceLock<HashMap<String, Response<Bytes>>>,
}

impl BatchResponseContent {
    /// Wraps the raw aggregate response.
    #[must_use]
    pub const fn new(response: Response<Bytes>) -> Self {
        Self {
            response,
            parsed: OnceLock::new(),
        }
    }

    /// Status of the aggregate call itself.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.response.status()
    }

    /// All sub-responses, keyed by step id.
    pub fn responses(&self) -> &HashMap<String, Response<Bytes>> {
        self.parsed.get_or_init(|| self.parse())
    }

    /// The sub-response for one step id, if present.
    #[must_use]
    pub fn response_by_id(&self, id: &str) -> Option<&Response<Bytes>> {
        self.responses().get(id)
    }

    fn parse(&self) -> HashMap<String, Response<Bytes>> {
        let body = self.response.body();
        if body.is_empty() {
            return HashMap::new();
        }

        match serde_json::from_slice::<BatchResponsePayload>(body) {
            Ok(payload) => payload
                .responses
                .into_iter()
                .map(|item| {
                    let body = item
                        .body
                        .as_ref()
                        .and_then(|value| serde_json::to_vec(value).ok())
                        .map(Bytes::from)
                        .unwrap_or_default();
                    (item.id, Response::new(item.status, item.headers, body))
                })
                .collect(),
            Err(error) => {
                debug!(%error, "malformed batch response body");
                HashMap::new()
            }
        }
    }
}
