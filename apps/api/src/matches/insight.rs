//! Per-candidate presentation helpers: tier label, recommendation text and
//! a short description preview.

use serde::Serialize;

use crate::matches::engine::{HIGH_MATCH_THRESHOLD, MEDIUM_MATCH_THRESHOLD};
use crate::models::candidate::MatchedCandidate;

const PREVIEW_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Strong,
    Good,
    Weak,
}

impl MatchTier {
    pub fn for_score(score: f64) -> Self {
        if score >= HIGH_MATCH_THRESHOLD {
            MatchTier::Strong
        } else if score >= MEDIUM_MATCH_THRESHOLD {
            MatchTier::Good
        } else {
            MatchTier::Weak
        }
    }
}

/// A candidate as sent to clients: the raw record plus derived display fields.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateCard {
    #[serde(flatten)]
    pub candidate: MatchedCandidate,
    pub tier: MatchTier,
    pub recommendation: String,
    pub summary: String,
}

impl From<MatchedCandidate> for CandidateCard {
    fn from(candidate: MatchedCandidate) -> Self {
        let tier = MatchTier::for_score(candidate.score);
        let recommendation = build_recommendation(tier, &candidate.missing);
        let summary = description_preview(&candidate.description);
        Self {
            candidate,
            tier,
            recommendation,
            summary,
        }
    }
}

/// Builds a human-readable recommendation from the tier and missing qualifiers.
pub fn build_recommendation(tier: MatchTier, missing: &[String]) -> String {
    let top_missing: Vec<&str> = missing.iter().take(3).map(|m| m.as_str()).collect();

    match tier {
        MatchTier::Strong => {
            "Strong match. Your skills align well with the key requirements.".to_string()
        }
        MatchTier::Good if top_missing.is_empty() => {
            "Good match. Highlight your most relevant experience in the application.".to_string()
        }
        MatchTier::Good => format!(
            "Good match. Focus on gaining experience with: {}.",
            top_missing.join(", ")
        ),
        MatchTier::Weak if top_missing.is_empty() => {
            "Weak match. Look for roles with better alignment.".to_string()
        }
        MatchTier::Weak => format!(
            "Weak match. Consider gaining experience in {} or look for roles with better alignment.",
            top_missing.join(", ")
        ),
    }
}

/// First line of the description, cut to 500 characters.
pub fn description_preview(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= PREVIEW_MAX_CHARS {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(PREVIEW_MAX_CHARS).collect();
    format!("{cut}...")
}
