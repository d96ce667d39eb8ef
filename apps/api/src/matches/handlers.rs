use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::matches::engine::{build_view, MatchStats, ScoreBucket, SortKey, ViewConfiguration};
use crate::matches::insight::CandidateCard;
use crate::models::candidate::JobMatchReport;
use crate::models::document::DocumentId;
use crate::state::AppState;

// Flattening ViewConfiguration here would break numeric fields under
// urlencoded deserialization, so the query is spelled out.
#[derive(Deserialize)]
pub struct MatchesQuery {
    #[serde(default)]
    pub filter: ScoreBucket,
    #[serde(default)]
    pub sort: SortKey,
    pub page: Option<usize>,
    #[serde(default)]
    pub refresh: bool,
}

impl MatchesQuery {
    fn view(&self) -> ViewConfiguration {
        ViewConfiguration {
            filter: self.filter,
            sort: self.sort,
            page: self.page.unwrap_or(1),
        }
    }
}

#[derive(Serialize)]
pub struct MatchesResponse {
    pub items: Vec<CandidateCard>,
    pub page: usize,
    pub total_count: usize,
    pub page_count: usize,
    pub stats: MatchStats,
}

/// GET /api/v1/resumes/:id/matches?filter=&sort=&page=&refresh=
/// The raw list is fetched once per document; filter, sort and page changes
/// are computed locally.
pub async fn handle_matches(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<MatchesQuery>,
) -> Result<Json<MatchesResponse>, AppError> {
    let document_id = DocumentId::new(id);
    let candidates = state
        .matches
        .get_or_fetch(state.remote.as_ref(), &document_id, params.refresh)
        .await?;

    let view = build_view(&candidates, &params.view());
    Ok(Json(MatchesResponse {
        items: view.items.into_iter().map(CandidateCard::from).collect(),
        page: view.page,
        total_count: view.total_count,
        page_count: view.page_count,
        stats: view.stats,
    }))
}

#[derive(Deserialize)]
pub struct JobMatchRequest {
    #[serde(alias = "jobDescription")]
    pub job_description: String,
}

/// POST /api/v1/resumes/:id/job-match
pub async fn handle_job_match(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JobMatchRequest>,
) -> Result<Json<JobMatchReport>, AppError> {
    let job_description = req.job_description.trim();
    if job_description.is_empty() {
        return Err(AppError::Validation(
            "Please paste a job description".to_string(),
        ));
    }

    let report = state
        .remote
        .match_job_description(&DocumentId::new(id), job_description)
        .await?;
    Ok(Json(report))
}
