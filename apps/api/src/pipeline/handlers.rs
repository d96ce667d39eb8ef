use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::documents::handlers::require_user_id;
use crate::errors::AppError;
use crate::models::upload::UploadFile;
use crate::pipeline::session::SessionSnapshot;
use crate::pipeline::PipelineError;
use crate::state::AppState;

/// Multipart field carrying the document.
const FILE_FIELD: &str = "resume";

#[derive(Deserialize)]
pub struct UploadQuery {
    pub user_id: String,
    /// Hold the response until the session is terminal.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Serialize)]
pub struct UploadAccepted {
    pub session_id: Uuid,
}

/// POST /api/v1/resumes/upload?user_id=&wait=
/// Validates the file and starts a processing session. By default returns
/// 202 with the session id to poll; with `wait=true` returns the final
/// snapshot.
pub async fn handle_upload(
    State(state): State<AppState>,
    Query(params): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let user_id = require_user_id(&params.user_id)?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;

        let mut upload = UploadFile::new(file_name, bytes);
        upload.content_type = content_type;
        file = Some(upload);
        break;
    }

    let file = file.ok_or_else(|| {
        AppError::Validation(format!("Missing '{FILE_FIELD}' file field"))
    })?;

    let mut handle = match state.coordinator.submit(user_id, file) {
        Ok(handle) => handle,
        Err(PipelineError::SessionInProgress(_)) => {
            let active = state
                .coordinator
                .active_session(user_id)
                .map(|id| format!(" (session {id})"))
                .unwrap_or_default();
            return Err(AppError::Conflict(format!(
                "A resume is already being processed{active}"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if params.wait {
        return Ok(Json(handle.wait().await).into_response());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            session_id: handle.session_id,
        }),
    )
        .into_response())
}

/// GET /api/v1/sessions/:id
pub async fn handle_session_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    state
        .coordinator
        .status(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_cancel_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.coordinator.cancel(id)?;
    Ok(StatusCode::NO_CONTENT)
}
