//! HTTP implementation of `RemoteProcessor`.
//!
//! Single-shot calls only: the pipeline owns retry and backoff so that the
//! stage ordering stays in one place.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, Method, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::candidate::{JobMatchReport, MatchedCandidate};
use crate::models::document::{Document, DocumentAnalysis, DocumentId};
use crate::models::upload::{UploadFile, UploadReceipt};
use crate::remote::{RemoteError, RemoteProcessor};

/// Header carrying the pipeline session id on every stage call.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResumeRef<'a> {
    resume_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobMatchRequest<'a> {
    resume_id: &'a str,
    job_description: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error", alias = "errorMessage")]
    message: String,
}

#[derive(Clone)]
pub struct HttpRemoteProcessor {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpRemoteProcessor {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.endpoint(segments));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        warn!("Processor returned {}: {}", status, message);

        Err(RemoteError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let body = self.send(builder).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RemoteError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RemoteProcessor for HttpRemoteProcessor {
    async fn upload(
        &self,
        user_id: &str,
        file: &UploadFile,
        correlation: Uuid,
    ) -> Result<UploadReceipt, RemoteError> {
        let mut part = multipart::Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type)?;
        }
        let form = multipart::Form::new()
            .text("userId", user_id.to_string())
            .part("resume", part);

        debug!("Uploading {} ({} bytes)", file.file_name, file.len());
        let builder = self
            .request(Method::POST, &["api", "resume", "upload"])
            .header(SESSION_HEADER, correlation.to_string())
            .multipart(form);

        self.send_json(builder).await
    }

    async fn analyze(
        &self,
        document_id: &DocumentId,
        correlation: Uuid,
    ) -> Result<(), RemoteError> {
        let builder = self
            .request(Method::POST, &["api", "analyze", "extract-skills"])
            .header(SESSION_HEADER, correlation.to_string())
            .json(&ResumeRef {
                resume_id: document_id.as_str(),
            });

        // The acknowledgement body is opaque.
        self.send(builder).await?;
        Ok(())
    }

    async fn compute_stats(
        &self,
        document_id: &DocumentId,
        correlation: Uuid,
    ) -> Result<DocumentAnalysis, RemoteError> {
        let builder = self
            .request(Method::POST, &["api", "stats", "update"])
            .header(SESSION_HEADER, correlation.to_string())
            .json(&ResumeRef {
                resume_id: document_id.as_str(),
            });

        self.send_json(builder).await
    }

    async fn fetch_matches(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<MatchedCandidate>, RemoteError> {
        let builder = self
            .request(Method::POST, &["api", "jobs", "match-real"])
            .json(&ResumeRef {
                resume_id: document_id.as_str(),
            });

        self.send_json(builder).await
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, RemoteError> {
        let builder = self.request(Method::GET, &["api", "resume", "my-resumes", user_id]);
        self.send_json(builder).await
    }

    async fn delete_document(&self, document_id: &DocumentId) -> Result<(), RemoteError> {
        let builder = self.request(
            Method::DELETE,
            &["api", "resume", "delete", document_id.as_str()],
        );
        self.send(builder).await?;
        Ok(())
    }

    async fn download_document(
        &self,
        document_id: &DocumentId,
        user_id: &str,
    ) -> Result<Bytes, RemoteError> {
        let builder = self.request(
            Method::GET,
            &["api", "resume", "download", document_id.as_str(), user_id],
        );
        Ok(self.send(builder).await?.bytes().await?)
    }

    async fn match_job_description(
        &self,
        document_id: &DocumentId,
        job_description: &str,
    ) -> Result<JobMatchReport, RemoteError> {
        let builder = self
            .request(Method::POST, &["api", "analyze", "match-job"])
            .json(&JobMatchRequest {
                resume_id: document_id.as_str(),
                job_description,
            });

        self.send_json(builder).await
    }
}

/// Pulls a human-readable message out of an error body, falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string())
}
