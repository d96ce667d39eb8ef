use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline state machine:
/// `Idle → Uploading → Analyzing → ComputingStats → Complete`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Uploading,
    Analyzing,
    ComputingStats,
    Complete,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Uploading => "uploading",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::ComputingStats => "computing_stats",
            PipelineStage::Complete => "complete",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Failed)
    }

    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (current, Failed) => !current.is_terminal(),
            (Idle, Uploading)
            | (Uploading, Analyzing)
            | (Analyzing, ComputingStats)
            | (ComputingStats, Complete) => true,
            _ => false,
        }
    }

    /// Status line shown while the stage is current.
    pub fn status_line(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "Waiting to start",
            PipelineStage::Uploading => "Uploading file...",
            PipelineStage::Analyzing => "Analyzing resume...",
            PipelineStage::ComputingStats => "Updating stats...",
            PipelineStage::Complete => "Stats updated",
            PipelineStage::Failed => "Upload failed. Please try again.",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::Idle => "Idle",
            PipelineStage::Uploading => "Uploading",
            PipelineStage::Analyzing => "Analyzing",
            PipelineStage::ComputingStats => "ComputingStats",
            PipelineStage::Complete => "Complete",
            PipelineStage::Failed => "Failed",
        };
        f.write_str(label)
    }
}
