use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::document::{DocumentAnalysis, DocumentId};
use crate::pipeline::stage::PipelineStage;

/// Why a progress event was not applied. Never surfaced to clients.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StaleEvent {
    #[error("event carries no session id")]
    Uncorrelated,

    #[error("event belongs to session {0}")]
    ForeignSession(Uuid),

    #[error("session {0} has already ended")]
    SessionEnded(Uuid),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("illegal transition {from} → {to}")]
pub struct IllegalTransition {
    pub from: PipelineStage,
    pub to: PipelineStage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub reason: String,
}

/// The single status value consumers observe for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub user_id: String,
    pub document_id: Option<DocumentId>,
    pub stage: PipelineStage,
    /// Every stage entered so far, in order.
    pub stages: Vec<PipelineStage>,
    pub message: String,
    pub result: Option<DocumentAnalysis>,
    pub failure: Option<StageFailure>,
    /// Torn down by its client. `stage` stays where the run stopped.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(session_id: Uuid, user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id: user_id.to_string(),
            document_id: None,
            stage: PipelineStage::Idle,
            stages: vec![PipelineStage::Idle],
            message: PipelineStage::Idle.status_line().to_string(),
            result: None,
            failure: None,
            cancelled: false,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Terminal, or cancelled before reaching a terminal stage.
    pub fn is_finished(&self) -> bool {
        self.is_terminal() || self.cancelled
    }

    /// Records a client teardown. Leaves stage, result and failure untouched.
    pub fn mark_cancelled(&mut self) {
        if self.is_finished() {
            return;
        }
        self.cancelled = true;
        self.message = "Cancelled".to_string();
        self.updated_at = Utc::now();
    }

    pub fn advance(&mut self, next: PipelineStage) -> Result<(), IllegalTransition> {
        if !self.stage.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.stages.push(next);
        self.message = next.status_line().to_string();
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self, analysis: DocumentAnalysis) -> Result<(), IllegalTransition> {
        self.advance(PipelineStage::Complete)?;
        self.result = Some(analysis);
        Ok(())
    }

    /// Moves to `Failed`. Any result is discarded: a failed run keeps no partial output.
    pub fn fail(&mut self, stage: PipelineStage, reason: String) -> Result<(), IllegalTransition> {
        self.advance(PipelineStage::Failed)?;
        self.result = None;
        self.failure = Some(StageFailure { stage, reason });
        Ok(())
    }

    pub fn record_progress(&mut self, message: &str) -> Result<(), StaleEvent> {
        if self.is_finished() {
            return Err(StaleEvent::SessionEnded(self.session_id));
        }
        self.message = message.to_string();
        self.updated_at = Utc::now();
        Ok(())
    }
}
