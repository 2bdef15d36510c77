//! HTTP-backed document service.
//!
//! Speaks the service's REST surface: `GET {base}/documents/{id}` for
//! snapshots and `POST {base}/documents/{id}:batchMutate` for operation
//! batches, with bearer-token auth. Status codes are classified for the
//! retry policy here; the engine never sees transport types.

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::ops::{EditOperation, Reply};
use crate::service::{DocumentService, ServiceError};

pub struct HttpDocumentService {
    base_url: String,
    token: String,
}

impl HttpDocumentService {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            token: token.into(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

#[derive(Serialize)]
struct MutateRequest<'a> {
    operations: &'a [EditOperation],
}

#[derive(Deserialize)]
struct MutateResponse {
    #[serde(default)]
    replies: Vec<Reply>,
}

impl DocumentService for HttpDocumentService {
    #[tracing::instrument(level = "debug", skip(self))]
    fn fetch(&self, id: &str) -> Result<Document, ServiceError> {
        let url = format!("{}/documents/{id}", self.base_url);
        let mut response = ureq::get(url.as_str())
            .header("authorization", &self.auth_header())
            .call()
            .map_err(classify)?;
        response
            .body_mut()
            .read_json::<Document>()
            .map_err(|e| ServiceError::Permanent(format!("malformed snapshot: {e}")))
    }

    #[tracing::instrument(level = "debug", skip(self, ops), fields(ops = ops.len()))]
    fn batch_mutate(&self, id: &str, ops: &[EditOperation]) -> Result<Vec<Reply>, ServiceError> {
        let url = format!("{}/documents/{id}:batchMutate", self.base_url);
        let mut response = ureq::post(url.as_str())
            .header("authorization", &self.auth_header())
            .send_json(MutateRequest { operations: ops })
            .map_err(classify)?;
        let parsed = response
            .body_mut()
            .read_json::<MutateResponse>()
            .map_err(|e| ServiceError::Permanent(format!("malformed replies: {e}")))?;
        Ok(parsed.replies)
    }
}

fn classify(error: ureq::Error) -> ServiceError {
    match error {
        ureq::Error::StatusCode(429) => ServiceError::RateLimited("http 429".to_string()),
        ureq::Error::StatusCode(code) if (500..=599).contains(&code) => {
            ServiceError::Transient(format!("http {code}"))
        }
        ureq::Error::StatusCode(code) => ServiceError::Permanent(format!("http {code}")),
        // Everything without a status is transport-level: timeouts, resets,
        // DNS. Safe to retry for reads; the mutate retry predicate already
        // refuses these.
        other => ServiceError::Transient(other.to_string()),
    }
}
