// Processing pipeline: upload → analyze → compute stats, one session per upload.
// Stage calls go through remote::RemoteProcessor; progress text through progress::ProgressChannel.

pub mod coordinator;
pub mod handlers;
pub mod session;
pub mod stage;
pub mod validation;

use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::stage::PipelineStage;
use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("A processing session is already in progress for user {0}")]
    SessionInProgress(String),

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("{stage} failed: {source}")]
    Transport {
        stage: PipelineStage,
        source: RemoteError,
    },

    #[error("{stage} failed: {reason}")]
    Rejected {
        stage: PipelineStage,
        reason: String,
    },

    #[error("Session cancelled")]
    Cancelled,
}

impl PipelineError {
    /// The stage a session-scoped failure belongs to, if it carries one.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineError::Transport { stage, .. } | PipelineError::Rejected { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}
