//! Match result engine: pure transformation from a raw candidate list and a
//! view configuration to one page of results plus aggregate statistics.
//!
//! Steps:
//! 1. filter by score bucket
//! 2. stable sort by the selected key
//! 3. paginate (fixed page size, 1-based pages)
//!
//! Statistics are always computed over the unfiltered list.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::candidate::MatchedCandidate;

pub const PAGE_SIZE: usize = 10;
pub const HIGH_MATCH_THRESHOLD: f64 = 8.0;
pub const MEDIUM_MATCH_THRESHOLD: f64 = 6.0;
pub const TOP_SKILL_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBucket {
    #[default]
    All,
    High,   // ≥ 8
    Medium, // 6 – 7.99
    Low,    // < 6
}

impl ScoreBucket {
    pub fn contains(&self, score: f64) -> bool {
        match self {
            ScoreBucket::All => true,
            ScoreBucket::High => score >= HIGH_MATCH_THRESHOLD,
            ScoreBucket::Medium => {
                (MEDIUM_MATCH_THRESHOLD..HIGH_MATCH_THRESHOLD).contains(&score)
            }
            ScoreBucket::Low => score < MEDIUM_MATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Score,
    Title,
    Company,
}

fn first_page() -> usize {
    1
}

/// Client-side view state. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfiguration {
    #[serde(default)]
    pub filter: ScoreBucket,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default = "first_page")]
    pub page: usize,
}

impl Default for ViewConfiguration {
    fn default() -> Self {
        Self {
            filter: ScoreBucket::All,
            sort: SortKey::Score,
            page: first_page(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchStats {
    pub total_count: usize,
    pub high_match_count: usize,
    pub average_score: f64,
    pub top_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchView {
    pub items: Vec<MatchedCandidate>,
    pub page: usize,
    /// Number of candidates after filtering.
    pub total_count: usize,
    pub page_count: usize,
    pub stats: MatchStats,
}

pub fn build_view(candidates: &[MatchedCandidate], config: &ViewConfiguration) -> MatchView {
    let mut filtered = filter_candidates(candidates, config.filter);
    sort_candidates(&mut filtered, config.sort);

    MatchView {
        items: paginate(&filtered, config.page)
            .iter()
            .map(|c| (*c).clone())
            .collect(),
        page: config.page,
        total_count: filtered.len(),
        page_count: page_count(filtered.len()),
        stats: compute_stats(candidates),
    }
}

pub fn filter_candidates(
    candidates: &[MatchedCandidate],
    bucket: ScoreBucket,
) -> Vec<&MatchedCandidate> {
    candidates
        .iter()
        .filter(|c| bucket.contains(c.score))
        .collect()
}

/// Stable: candidates that compare equal keep their input order.
pub fn sort_candidates(candidates: &mut [&MatchedCandidate], key: SortKey) {
    match key {
        SortKey::Score => candidates.sort_by(|a, b| b.score.total_cmp(&a.score)),
        SortKey::Title => candidates.sort_by(|a, b| compare_ignore_case(&a.title, &b.title)),
        SortKey::Company => {
            candidates.sort_by(|a, b| compare_ignore_case(&a.company, &b.company))
        }
    }
}

fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

pub fn page_count(total: usize) -> usize {
    total.div_ceil(PAGE_SIZE)
}

/// Items on a 1-based page. Out-of-range pages (including 0) are empty.
pub fn paginate<T>(items: &[T], page: usize) -> &[T] {
    if page == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(PAGE_SIZE);
    if start >= items.len() {
        return &[];
    }
    let end = (start + PAGE_SIZE).min(items.len());
    &items[start..end]
}

pub fn compute_stats(candidates: &[MatchedCandidate]) -> MatchStats {
    let total_count = candidates.len();
    let high_match_count = candidates
        .iter()
        .filter(|c| ScoreBucket::High.contains(c.score))
        .count();
    let average_score = if total_count == 0 {
        0.0
    } else {
        candidates.iter().map(|c| c.score).sum::<f64>() / total_count as f64
    };

    MatchStats {
        total_count,
        high_match_count,
        average_score,
        top_skills: top_skills(candidates, TOP_SKILL_LIMIT),
    }
}

/// Most frequent strengths across all candidates; ties break alphabetically.
pub fn top_skills(candidates: &[MatchedCandidate], limit: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for skill in candidates.iter().flat_map(|c| c.strengths.iter()) {
        let skill = skill.trim();
        if !skill.is_empty() {
            *counts.entry(skill).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(skill, _)| skill.to_string())
        .collect()
}
