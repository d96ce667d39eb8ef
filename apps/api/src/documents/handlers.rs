use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::document::{Document, DocumentId};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

impl UserQuery {
    pub fn user_id(&self) -> Result<&str, AppError> {
        require_user_id(&self.user_id)
    }
}

pub fn require_user_id(raw: &str) -> Result<&str, AppError> {
    let user_id = raw.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("user_id is required".to_string()));
    }
    Ok(user_id)
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: String,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// GET /api/v1/resumes?user_id=&refresh=
/// Served from the collection store; fetched on first use or on demand.
pub async fn handle_list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let user_id = require_user_id(&params.user_id)?;

    let documents = if params.refresh {
        state.store.refresh(user_id).await?
    } else {
        state.store.get_or_refresh(user_id).await?
    };

    Ok(Json(DocumentListResponse {
        documents: documents.to_vec(),
        refreshed_at: state.store.refreshed_at(user_id),
    }))
}

/// DELETE /api/v1/resumes/:id?user_id=
pub async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<UserQuery>,
) -> Result<StatusCode, AppError> {
    let user_id = params.user_id()?;
    let document_id = DocumentId::new(id);

    let outcome = state
        .store
        .invalidate_after(user_id, state.remote.delete_document(&document_id))
        .await;
    state.matches.invalidate(&document_id);
    outcome?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/resumes/:id/download?user_id=
pub async fn handle_download_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = params.user_id()?;
    let document_id = DocumentId::new(id);

    let bytes = state
        .remote
        .download_document(&document_id, user_id)
        .await?;

    let file_name = state
        .store
        .document(user_id, &document_id)
        .map(|doc| doc.name)
        .unwrap_or_else(|| format!("{document_id}.pdf"));

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
            ),
        ],
        bytes,
    ))
}
