use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque document identifier minted by the remote processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-computed score and feedback for an analyzed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub score: f64, // 0 – 10
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl DocumentAnalysis {
    pub fn has_valid_score(&self) -> bool {
        self.score.is_finite() && (0.0..=10.0).contains(&self.score)
    }
}

/// A user-submitted document as last reported by the remote processor.
///
/// `analysis` is all-or-nothing: a row carrying only some of the derived
/// fields is treated as unanalyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DocumentRow")]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub analysis: Option<DocumentAnalysis>,
}

impl Document {
    pub fn is_analyzed(&self) -> bool {
        self.analysis.is_some()
    }
}

/// Flat row shape returned by the processor's document listing.
#[derive(Debug, Deserialize)]
struct DocumentRow {
    #[serde(alias = "_id", alias = "resumeId")]
    id: DocumentId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "createdAt")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    strengths: Option<Vec<String>>,
    #[serde(default)]
    weaknesses: Option<Vec<String>>,
    #[serde(default)]
    improvements: Option<Vec<String>>,
    // Serialized `Document`s carry the nested form.
    #[serde(default)]
    analysis: Option<DocumentAnalysis>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        let flat = match (row.score, row.strengths, row.weaknesses, row.improvements) {
            (Some(score), Some(strengths), Some(weaknesses), Some(improvements)) => {
                Some(DocumentAnalysis {
                    score,
                    strengths,
                    weaknesses,
                    improvements,
                })
            }
            _ => None,
        };

        Document {
            id: row.id,
            name: row
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Untitled Resume".to_string()),
            created_at: row.created_at,
            analysis: row.analysis.or(flat),
        }
    }
}
