//! In-memory `RemoteProcessor` for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::models::candidate::{JobMatchReport, MatchedCandidate};
use crate::models::document::{Document, DocumentAnalysis, DocumentId};
use crate::models::upload::{UploadFile, UploadReceipt};
use crate::progress::local::LocalProgressChannel;
use crate::remote::{RemoteError, RemoteProcessor};

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    documents: HashMap<String, Vec<Document>>,
    failures: HashMap<&'static str, VecDeque<u16>>,
    receipt: Option<(Option<DocumentId>, bool)>,
    matches: Vec<MatchedCandidate>,
    next_id: u32,
}

pub struct FakeRemote {
    state: Mutex<FakeState>,
    analysis: DocumentAnalysis,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
    progress: Option<(LocalProgressChannel, String)>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            analysis: sample_analysis(),
            gates: Mutex::new(HashMap::new()),
            progress: None,
        }
    }

    pub fn with_analysis(mut self, analysis: DocumentAnalysis) -> Self {
        self.analysis = analysis;
        self
    }

    /// Publishes a tagged progress event on `topic` during each stage call.
    pub fn with_progress(mut self, channel: LocalProgressChannel, topic: &str) -> Self {
        self.progress = Some((channel, topic.to_string()));
        self
    }

    /// The next call to `op` fails with `status`. Queued failures are consumed in order.
    pub fn fail_next(&self, op: &'static str, status: u16) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(status);
    }

    pub fn set_receipt(&self, document_id: Option<&str>, accepted: bool) {
        self.lock().receipt = Some((document_id.map(DocumentId::new), accepted));
    }

    pub fn set_matches(&self, matches: Vec<MatchedCandidate>) {
        self.lock().matches = matches;
    }

    pub fn seed_documents(&self, user_id: &str, documents: Vec<Document>) {
        self.lock().documents.insert(user_id.to_string(), documents);
    }

    /// Makes `op` block until the returned gate is notified.
    pub fn hold(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(op, Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Records the call, waits on any gate, then applies a queued failure.
    async fn enter(&self, op: &'static str, detail: &str) -> Result<(), RemoteError> {
        self.lock().calls.push(format!("{op}:{detail}"));

        let gate = self.gates.lock().unwrap().get(op).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let failure = self
            .lock()
            .failures
            .get_mut(op)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(status) => Err(RemoteError::Status {
                status,
                message: format!("injected {op} failure"),
            }),
            None => Ok(()),
        }
    }

    fn emit(&self, correlation: Uuid, message: &str) {
        if let Some((channel, topic)) = &self.progress {
            channel.publish(
                topic,
                format!(r#"{{"session_id":"{correlation}","message":"{message}"}}"#),
            );
        }
    }
}

#[async_trait]
impl RemoteProcessor for FakeRemote {
    async fn upload(
        &self,
        user_id: &str,
        file: &UploadFile,
        correlation: Uuid,
    ) -> Result<UploadReceipt, RemoteError> {
        self.enter("upload", &file.file_name).await?;
        self.emit(correlation, "File received");

        let mut state = self.lock();
        let (document_id, accepted) = match state.receipt.clone() {
            Some(receipt) => receipt,
            None => {
                state.next_id += 1;
                (Some(DocumentId::new(format!("doc-{}", state.next_id))), true)
            }
        };

        if let (Some(id), true) = (&document_id, accepted) {
            state
                .documents
                .entry(user_id.to_string())
                .or_default()
                .push(Document {
                    id: id.clone(),
                    name: file.file_name.clone(),
                    created_at: None,
                    analysis: None,
                });
        }

        Ok(UploadReceipt {
            document_id,
            accepted,
        })
    }

    async fn analyze(
        &self,
        document_id: &DocumentId,
        correlation: Uuid,
    ) -> Result<(), RemoteError> {
        self.enter("analyze", document_id.as_str()).await?;
        self.emit(correlation, "Extracting skills");
        Ok(())
    }

    async fn compute_stats(
        &self,
        document_id: &DocumentId,
        correlation: Uuid,
    ) -> Result<DocumentAnalysis, RemoteError> {
        self.enter("compute_stats", document_id.as_str()).await?;
        self.emit(correlation, "Scoring");

        let mut state = self.lock();
        for documents in state.documents.values_mut() {
            for doc in documents.iter_mut().filter(|d| &d.id == document_id) {
                doc.analysis = Some(self.analysis.clone());
            }
        }
        Ok(self.analysis.clone())
    }

    async fn fetch_matches(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<MatchedCandidate>, RemoteError> {
        self.enter("fetch_matches", document_id.as_str()).await?;
        Ok(self.lock().matches.clone())
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, RemoteError> {
        self.enter("list_documents", user_id).await?;
        Ok(self.lock().documents.get(user_id).cloned().unwrap_or_default())
    }

    async fn delete_document(&self, document_id: &DocumentId) -> Result<(), RemoteError> {
        self.enter("delete_document", document_id.as_str()).await?;
        for documents in self.lock().documents.values_mut() {
            documents.retain(|d| &d.id != document_id);
        }
        Ok(())
    }

    async fn download_document(
        &self,
        document_id: &DocumentId,
        _user_id: &str,
    ) -> Result<Bytes, RemoteError> {
        self.enter("download_document", document_id.as_str()).await?;
        Ok(Bytes::from_static(b"%PDF-1.7 fake"))
    }

    async fn match_job_description(
        &self,
        document_id: &DocumentId,
        _job_description: &str,
    ) -> Result<JobMatchReport, RemoteError> {
        self.enter("match_job_description", document_id.as_str())
            .await?;
        Ok(JobMatchReport {
            score: 74.0,
            strong_matches: vec!["Rust".to_string()],
            missing: vec!["Kafka".to_string()],
            suggestions: vec!["Mention event streaming work".to_string()],
        })
    }
}

pub fn sample_analysis() -> DocumentAnalysis {
    DocumentAnalysis {
        score: 8.2,
        strengths: vec!["Rust".to_string(), "Distributed systems".to_string()],
        weaknesses: vec!["Few metrics".to_string()],
        improvements: vec!["Quantify impact".to_string()],
    }
}

pub fn candidate(title: &str, company: &str, score: f64, strengths: &[&str]) -> MatchedCandidate {
    MatchedCandidate {
        title: title.to_string(),
        company: company.to_string(),
        location: "Remote".to_string(),
        description: format!("{title} at {company}"),
        apply_link: format!("https://jobs.example/{}", title.to_lowercase().replace(' ', "-")),
        score,
        strengths: strengths.iter().map(|s| s.to_string()).collect(),
        missing: vec![],
    }
}
