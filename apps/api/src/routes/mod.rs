pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::documents::handlers as documents;
use crate::matches::handlers as matches;
use crate::pipeline::handlers as pipeline;
use crate::state::AppState;

/// Headroom for multipart framing on top of the file size ceiling.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        // Processing pipeline
        .route(
            "/api/v1/resumes/upload",
            post(pipeline::handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/v1/sessions/:id",
            get(pipeline::handle_session_status).delete(pipeline::handle_cancel_session),
        )
        // Document collection
        .route("/api/v1/resumes", get(documents::handle_list_documents))
        .route(
            "/api/v1/resumes/:id",
            delete(documents::handle_delete_document),
        )
        .route(
            "/api/v1/resumes/:id/download",
            get(documents::handle_download_document),
        )
        // Matches
        .route("/api/v1/resumes/:id/matches", get(matches::handle_matches))
        .route(
            "/api/v1/resumes/:id/job-match",
            post(matches::handle_job_match),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::models::document::{Document, DocumentId};
    use crate::pipeline::stage::PipelineStage;
    use crate::progress::local::LocalProgressChannel;
    use crate::remote::fake::{candidate, sample_analysis, FakeRemote};

    const BOUNDARY: &str = "resumatch-test-boundary";

    fn test_config() -> Config {
        Config {
            remote_api_url: "http://processor.test".to_string(),
            remote_api_token: None,
            redis_url: None,
            progress_topic: "resume-processing".to_string(),
            accepted_extensions: vec!["pdf".to_string(), "doc".to_string(), "docx".to_string()],
            max_upload_bytes: 1024,
            stage_timeout: Duration::from_secs(5),
            stage_max_attempts: 1,
            stage_backoff: Duration::from_millis(1),
            session_retention: Duration::from_secs(60),
            match_cache_capacity: 8,
            port: 0,
            rust_log: "info".to_string(),
        }
    }

    fn app() -> (Router, Arc<FakeRemote>, AppState) {
        let remote = Arc::new(FakeRemote::new());
        let state = AppState::new(
            test_config(),
            remote.clone(),
            Arc::new(LocalProgressChannel::new()),
        );
        (build_router(state.clone()), remote, state)
    }

    fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(query: &str, field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(format!("/api/v1/resumes/upload?{query}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, file_name, content)))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _, _) = app();
        let response = router.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["service"], "resumatch");
    }

    #[tokio::test]
    async fn test_upload_runs_session_to_completion() {
        let (router, remote, state) = app();

        let response = router
            .clone()
            .oneshot(upload_request("user_id=u1", "resume", "cv.pdf", b"%PDF-1.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let session_id = json_body(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let id = session_id.parse().unwrap();
        while state
            .coordinator
            .status(id)
            .map_or(true, |s| !s.is_terminal())
        {
            tokio::task::yield_now().await;
        }

        let response = router
            .oneshot(get_request(&format!("/api/v1/sessions/{session_id}")))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["stage"], "complete");
        assert_eq!(body["message"], PipelineStage::Complete.status_line());
        assert_eq!(body["result"]["score"], sample_analysis().score);
        assert_eq!(remote.count("compute_stats"), 1);
    }

    #[tokio::test]
    async fn test_upload_can_wait_for_final_snapshot() {
        let (router, remote, _) = app();
        remote.fail_next("analyze", 500);

        let response = router
            .oneshot(upload_request("user_id=u1&wait=true", "resume", "cv.pdf", b"%PDF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["stage"], "failed");
        assert_eq!(body["failure"]["stage"], "analyzing");
        assert!(body["result"].is_null());
    }

    #[tokio::test]
    async fn test_upload_with_unsupported_type_is_400() {
        let (router, remote, _) = app();
        let response = router
            .oneshot(upload_request("user_id=u1", "resume", "cv.exe", b"MZ"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_file_field_is_400() {
        let (router, _, _) = app();
        let response = router
            .oneshot(upload_request("user_id=u1", "attachment", "cv.pdf", b"%PDF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_second_upload_in_flight_is_409() {
        let (router, remote, _) = app();
        let _gate = remote.hold("upload");

        let first = router
            .clone()
            .oneshot(upload_request("user_id=u1", "resume", "a.pdf", b"%PDF"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let session_id = json_body(first).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let second = router
            .oneshot(upload_request("user_id=u1", "resume", "b.pdf", b"%PDF"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let message = json_body(second).await["error"]["message"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(message.contains(&session_id));
    }

    #[tokio::test]
    async fn test_cancel_session() {
        let (router, remote, state) = app();
        let _gate = remote.hold("upload");

        let response = router
            .clone()
            .oneshot(upload_request("user_id=u1", "resume", "a.pdf", b"%PDF"))
            .await
            .unwrap();
        let session_id = json_body(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(format!("/api/v1/sessions/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.coordinator.active_session("u1").is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let response = router
            .clone()
            .oneshot(get_request(&format!("/api/v1/sessions/{session_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["cancelled"], json!(true));

        let response = router
            .oneshot(get_request("/api/v1/sessions/00000000-0000-0000-0000-000000000000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_delete_and_download_documents() {
        let (router, remote, _) = app();
        remote.seed_documents(
            "u1",
            vec![
                Document {
                    id: DocumentId::new("r1"),
                    name: "Backend.pdf".to_string(),
                    created_at: None,
                    analysis: Some(sample_analysis()),
                },
                Document {
                    id: DocumentId::new("r2"),
                    name: "Old.pdf".to_string(),
                    created_at: None,
                    analysis: None,
                },
            ],
        );

        let response = router
            .clone()
            .oneshot(get_request("/api/v1/resumes?user_id=u1"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["documents"].as_array().unwrap().len(), 2);

        let response = router
            .clone()
            .oneshot(get_request("/api/v1/resumes/r1/download?user_id=u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Backend.pdf\""
        );

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/v1/resumes/r2?user_id=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // The store was refreshed by the delete; no extra fetch needed.
        let response = router
            .oneshot(get_request("/api/v1/resumes?user_id=u1"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["documents"].as_array().unwrap().len(), 1);
        assert_eq!(remote.count("list_documents"), 2);
    }

    #[tokio::test]
    async fn test_list_without_user_is_400() {
        let (router, _, _) = app();
        let response = router
            .oneshot(get_request("/api/v1/resumes?user_id="))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_matches_view_is_served_from_cache() {
        let (router, remote, _) = app();
        remote.set_matches(vec![
            candidate("Backend Engineer", "Acme", 8.5, &["Rust"]),
            candidate("Data Engineer", "Globex", 6.5, &["SQL"]),
            candidate("Support", "Initech", 3.0, &[]),
        ]);

        let response = router
            .clone()
            .oneshot(get_request("/api/v1/resumes/r1/matches?filter=high"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total_count"], 1);
        assert_eq!(body["items"][0]["title"], "Backend Engineer");
        assert_eq!(body["items"][0]["tier"], "strong");
        assert_eq!(body["stats"]["total_count"], 3);
        assert_eq!(body["stats"]["high_match_count"], 1);

        let response = router
            .clone()
            .oneshot(get_request("/api/v1/resumes/r1/matches?sort=company&page=1"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["items"][0]["company"], "Acme");
        assert_eq!(body["items"][2]["company"], "Initech");
        assert_eq!(remote.count("fetch_matches"), 1);

        router
            .oneshot(get_request("/api/v1/resumes/r1/matches?refresh=true"))
            .await
            .unwrap();
        assert_eq!(remote.count("fetch_matches"), 2);
    }

    #[tokio::test]
    async fn test_job_match_requires_description() {
        let (router, remote, _) = app();
        let request = |body: Value| {
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/resumes/r1/job-match")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let response = router
            .clone()
            .oneshot(request(json!({ "job_description": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(remote.count("match_job_description"), 0);

        let response = router
            .oneshot(request(json!({ "jobDescription": "Rust, Kafka" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["strong_matches"][0], "Rust");
    }
}
