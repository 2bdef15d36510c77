//! The document-service seam.
//!
//! The engine never constructs its own network client; it is handed
//! something implementing [`DocumentService`]. Production wiring uses the
//! HTTP client behind the `network` feature; tests use in-memory fakes.

use crate::document::Document;
use crate::ops::{EditOperation, Reply};

/// Errors a service implementation may surface, pre-classified for the retry
/// policy: rate limits were rejected before application and are always safe
/// to retry; other transient failures are only safe to retry for reads.
#[non_exhaustive]
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum ServiceError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient service failure: {0}")]
    Transient(String),

    #[error("service failure: {0}")]
    Permanent(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Whether a *read* may be retried after this error.
    #[must_use]
    pub fn retryable_for_fetch(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transient(_))
    }

    /// Whether a *mutation* may be retried after this error. A 5xx answer to
    /// a mutate is not retried: the batch may have partially applied
    /// server-side, and re-issuing it would double-apply the prefix.
    #[must_use]
    pub fn retryable_for_mutate(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// The two collaborator calls the engine depends on. Each is a single
/// network round trip; neither is idempotent across retries.
pub trait DocumentService {
    /// Fetch a fresh snapshot of the document.
    fn fetch(&self, id: &str) -> Result<Document, ServiceError>;

    /// Apply a batch of operations in order. Replies align index-for-index
    /// with the submitted operations.
    fn batch_mutate(&self, id: &str, ops: &[EditOperation]) -> Result<Vec<Reply>, ServiceError>;
}
