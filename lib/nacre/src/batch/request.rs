//! Batch request envelope encoding.

use bytes::Bytes;
use serde_json::{Map, Value};
use url::Url;

use crate::{Body, Error, Request, Result};

/// Maximum number of steps the service accepts in one batch.
pub const MAX_BATCH_STEPS: usize = 20;

/// One logical sub-request inside a batch.
#[derive(Debug)]
pub struct BatchRequestStep {
    id: String,
    request: Request,
    depends_on: Vec<String>,
}

impl BatchRequestStep {
    /// Creates a step with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>, request: Request) -> Self {
        Self {
            id: id.into(),
            request,
            depends_on: Vec::new(),
        }
    }

    /// Declares steps that must complete before this one runs.
    #[must_use]
    pub fn with_depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Step identifier, unique within its batch.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The embedded request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Ids of the steps this one depends on.
    #[must_use]
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// An ordered collection of [`BatchRequestStep`]s, encodable as one
/// `{"requests": [...]}` wire payload.
///
/// Ids are unique; insertion order is preserved for serialization. Removing
/// a step also strips its id from every other step's `dependsOn`, so the
/// payload never references a step that is no longer in the batch.
#[derive(Debug, Default)]
pub struct BatchRequestContent {
    steps: Vec<BatchRequestStep>,
    base_url: Option<Url>,
}

impl BatchRequestContent {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the versioned service base used to relativize step URLs.
    ///
    /// The batch endpoint itself carries the host and version prefix, so
    /// absolute step URLs under this base are downgraded to
    /// service-relative ones (`https://host/v1.0/me` becomes `/me`).
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Number of steps in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the batch holds no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The steps in insertion order.
    #[must_use]
    pub fn steps(&self) -> &[BatchRequestStep] {
        &self.steps
    }

    /// Looks up a step by id.
    #[must_use]
    pub fn step_by_id(&self, id: &str) -> Option<&BatchRequestStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Appends a step.
    ///
    /// Returns `false` without mutating the batch when the id is already
    /// taken or the batch is at [`MAX_BATCH_STEPS`].
    pub fn add_step(&mut self, step: BatchRequestStep) -> bool {
        if self.steps.len() >= MAX_BATCH_STEPS {
            return false;
        }
        if self.steps.iter().any(|existing| existing.id == step.id) {
            return false;
        }
        self.steps.push(step);
        true
    }

    /// Removes the step with the given id.
    ///
    /// The id is also removed from every remaining step's `dependsOn` set.
    /// Returns `false` if no step has the id.
    pub fn remove_step_by_id(&mut self, id: &str) -> bool {
        let Some(position) = self.steps.iter().position(|step| step.id == id) else {
            return false;
        };
        self.steps.remove(position);
        for step in &mut self.steps {
            step.depends_on.retain(|dependency| dependency != id);
        }
        true
    }

    /// Encodes the batch as a `{"requests": [...]}` JSON value.
    ///
    /// # Errors
    ///
    /// Fails when a step body is streamed or is not valid JSON.
    pub fn to_json(&self) -> Result<Value> {
        let requests = self
            .steps
            .iter()
            .map(|step| self.step_to_json(step))
            .collect::<Result<Vec<_>>>()?;

        let mut envelope = Map::new();
        envelope.insert("requests".to_string(), Value::Array(requests));
        Ok(Value::Object(envelope))
    }

    /// Encodes the batch as JSON bytes ready to POST to the batch endpoint.
    ///
    /// # Errors
    ///
    /// Fails when a step body is streamed or is not valid JSON.
    pub fn serialize(&self) -> Result<Bytes> {
        let value = self.to_json()?;
        serde_json::to_vec(&value).map(Bytes::from).map_err(Into::into)
    }

    fn step_to_json(&self, step: &BatchRequestStep) -> Result<Value> {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(step.id.clone()));
        object.insert(
            "method".to_string(),
            Value::String(step.request.method().as_str().to_string()),
        );
        object.insert(
            "url".to_string(),
            Value::String(relative_url(step.request.url(), self.base_url.as_ref())),
        );

        if !step.request.headers().is_empty() {
            let headers: Map<String, Value> = step
                .request
                .headers()
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect();
            object.insert("headers".to_string(), Value::Object(headers));
        }

        match step.request.body() {
            Body::Empty => {}
            Body::Bytes(bytes) if bytes.is_empty() => {}
            Body::Bytes(bytes) => {
                let body = serde_json::from_slice::<Value>(bytes).map_err(|e| {
                    Error::invalid_request(format!("batch step '{}' body is not JSON: {e}", step.id))
                })?;
                object.insert("body".to_string(), body);
            }
            Body::Stream(_) => {
                return Err(Error::invalid_request(format!(
                    "batch step '{}' requires a buffered body",
                    step.id
                )));
            }
        }

        if !step.depends_on.is_empty() {
            let depends_on = step
                .depends_on
                .iter()
                .map(|id| Value::String(id.clone()))
                .collect();
            object.insert("dependsOn".to_string(), Value::Array(depends_on));
        }

        Ok(Value::Object(object))
    }
}

/// Service-relative form of a step URL: the known base prefix stripped, or
/// the path and query when the URL lies outside the base.
fn relative_url(url: &Url, base_url: Option<&Url>) -> String {
    if let Some(base) = base_url {
        let prefix = base.as_str().trim_end_matches('/');
        if let Some(rest) = url.as_str().strip_prefix(prefix) {
            if rest.is_empty() {
                return "/".to_string();
            }
            if rest.starts_with('/') || rest.starts_with('?') {
                return if rest.starts_with('?') {
                    format!("/{rest}")
                } else {
                    rest.to_string()
                };
            }
        }
    }
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}
