use serde::{Deserialize, Serialize};

/// One scored job returned by the remote matcher for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedCandidate {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "applyLink")]
    pub apply_link: String,
    pub score: f64, // 0 – 10
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub missing: Vec<String>,
}

/// Result of matching a document against a pasted job description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMatchReport {
    #[serde(default)]
    pub score: f64,
    #[serde(default, alias = "strongMatches")]
    pub strong_matches: Vec<String>,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}
