//! REST control surface for the orchestrator.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::SessionError;
use crate::orchestrator::Orchestrator;
use crate::session::{FeedbackKind, SessionId, SessionRequest};

/// Shared state for every handler.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

// ── Error mapping ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::NotFound(_) => ApiError::NotFound(message),
            SessionError::UnknownPhase(_) => ApiError::BadRequest(message),
            // Invalid control operations against the current lifecycle
            // state are conflicts, not client formatting errors.
            SessionError::NotAwaitingFeedback { .. }
            | SessionError::Terminal { .. }
            | SessionError::AlreadyResolved(_) => ApiError::Conflict(message),
            SessionError::PhaseFailed { .. } | SessionError::Other(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

// ── Request bodies ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    brief: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest {
    /// Optional target phase; must match the phase awaiting feedback.
    #[serde(default)]
    phase_id: Option<u8>,
    #[serde(default = "default_feedback_kind")]
    kind: FeedbackKind,
    content: String,
}

fn default_feedback_kind() -> FeedbackKind {
    FeedbackKind::NaturalLanguage
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkipRequest {
    #[serde(default)]
    phase_id: Option<u8>,
    #[serde(default)]
    reason: Option<String>,
}

// ── Router ───────────────────────────────────────────────────────────

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/feedback", post(submit_feedback))
        .route("/api/sessions/{id}/skip", post(skip_feedback))
        .route("/api/sessions/{id}/cancel", post(cancel_session))
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.brief.trim().is_empty() {
        return Err(ApiError::BadRequest("brief must not be empty".to_string()));
    }
    let session = state
        .orchestrator
        .create_session(SessionRequest { brief: req.brief })
        .await;
    state.orchestrator.start(session.id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.session_ids().await)
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.orchestrator.snapshot(SessionId(id)).await?;
    Ok(Json(session))
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.kind == FeedbackKind::Skip {
        return Err(ApiError::BadRequest(
            "use the skip endpoint to skip a feedback window".to_string(),
        ));
    }
    state
        .orchestrator
        .submit_feedback(SessionId(id), req.phase_id, req.kind, req.content)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn skip_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<SkipRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or(SkipRequest {
        phase_id: None,
        reason: None,
    });
    state
        .orchestrator
        .skip_feedback(SessionId(id), req.phase_id, req.reason)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.cancel(SessionId(id)).await?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AtelierConfig;
    use crate::gateway::ScriptedGateway;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let orchestrator = Arc::new(Orchestrator::new(
            AtelierConfig::default(),
            Arc::new(ScriptedGateway::new(0.9)),
        ));
        api_router().with_state(Arc::new(AppState { orchestrator }))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn create_session_returns_created_snapshot() {
        let response = test_router()
            .oneshot(
                Request::post("/api/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"brief": "a poster"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["brief"], "a poster");
        assert_eq!(json["phases"].as_array().unwrap().len(), 7);
        assert!(json["id"].is_string());
    }

    #[tokio::test]
    async fn empty_brief_is_rejected() {
        let response = test_router()
            .oneshot(
                Request::post("/api/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"brief": "   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let response = test_router()
            .oneshot(
                Request::get(format!("/api/sessions/{}", Uuid::nil()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn feedback_outside_a_window_conflicts() {
        let orchestrator = Arc::new(Orchestrator::new(
            AtelierConfig::default(),
            Arc::new(ScriptedGateway::new(0.9)),
        ));
        let session = orchestrator
            .create_session(SessionRequest {
                brief: "a poster".to_string(),
            })
            .await;
        let app = api_router().with_state(Arc::new(AppState { orchestrator }));

        let response = app
            .oneshot(
                Request::post(format!("/api/sessions/{}/feedback", session.id))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"kind": "natural_language", "content": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn skip_kind_on_feedback_endpoint_is_rejected() {
        let response = test_router()
            .oneshot(
                Request::post(format!("/api/sessions/{}/feedback", Uuid::nil()))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"kind": "skip", "content": ""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_over_http() {
        let orchestrator = Arc::new(Orchestrator::new(
            AtelierConfig::default(),
            Arc::new(ScriptedGateway::new(0.9)),
        ));
        let session = orchestrator
            .create_session(SessionRequest {
                brief: "a poster".to_string(),
            })
            .await;
        let app = api_router().with_state(Arc::new(AppState { orchestrator }));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::post(format!("/api/sessions/{}/cancel", session.id))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);
        }
    }
}
