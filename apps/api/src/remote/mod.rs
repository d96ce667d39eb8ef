//! Remote processor: the request/response contract with the external
//! resume processing backend.
//!
//! Every call the service makes to the processor goes through the
//! `RemoteProcessor` trait so the pipeline, store and handlers can be driven
//! by an in-memory fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::models::candidate::{JobMatchReport, MatchedCandidate};
use crate::models::document::{Document, DocumentAnalysis, DocumentId};
use crate::models::upload::{UploadFile, UploadReceipt};

pub mod http;
pub mod retry;

#[cfg(test)]
pub mod fake;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("processor returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed processor response: {0}")]
    Malformed(String),

    #[error("invalid processor URL: {0}")]
    InvalidUrl(String),

    #[error("timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// Another request's fetch, which this one was waiting on, failed.
    #[error("shared fetch failed: {0}")]
    Coalesced(String),
}

impl RemoteError {
    /// Transport-class failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Http(e) => !e.is_decode() && !e.is_builder(),
            RemoteError::Status { status, .. } => *status == 429 || *status >= 500,
            RemoteError::Malformed(_) | RemoteError::InvalidUrl(_) => false,
            RemoteError::Timeout(_) => true,
            RemoteError::Coalesced(_) => false,
        }
    }

    /// Failures after which resending a create cannot duplicate it: the
    /// request was refused or never reached the processor. A timeout or a
    /// 500/502/504 may come after the document was already stored.
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            RemoteError::Http(e) => e.is_connect(),
            RemoteError::Status { status, .. } => *status == 429 || *status == 503,
            _ => false,
        }
    }
}

/// The processor's operations. `correlation` is the pipeline session id,
/// forwarded so the processor can tag the progress events it publishes.
#[async_trait]
pub trait RemoteProcessor: Send + Sync {
    async fn upload(
        &self,
        user_id: &str,
        file: &UploadFile,
        correlation: Uuid,
    ) -> Result<UploadReceipt, RemoteError>;

    async fn analyze(&self, document_id: &DocumentId, correlation: Uuid)
        -> Result<(), RemoteError>;

    async fn compute_stats(
        &self,
        document_id: &DocumentId,
        correlation: Uuid,
    ) -> Result<DocumentAnalysis, RemoteError>;

    async fn fetch_matches(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<MatchedCandidate>, RemoteError>;

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, RemoteError>;

    async fn delete_document(&self, document_id: &DocumentId) -> Result<(), RemoteError>;

    async fn download_document(
        &self,
        document_id: &DocumentId,
        user_id: &str,
    ) -> Result<Bytes, RemoteError>;

    async fn match_job_description(
        &self,
        document_id: &DocumentId,
        job_description: &str,
    ) -> Result<JobMatchReport, RemoteError>;
}
